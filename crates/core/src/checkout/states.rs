use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    Idle,
    Initiated,
    AwaitingPayment,
    Finalizing,
    Completed,
    Cancelled,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initiated => "initiated",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutEvent {
    CheckoutRequested,
    StartFailed,
    AgentRepliedWithText,
    PaymentFormRequested,
    PaymentSucceeded,
    PaymentDeclined,
    PaymentCancelled,
    CheckoutAbandoned,
    ReceiptMinted,
    MintFailed,
    NextOrderRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: CheckoutStage,
    pub to: CheckoutStage,
    pub event: CheckoutEvent,
}

/// Identity of one checkout attempt. Tokens only ever increase, so a late
/// callback carrying an older token can be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptToken(pub u64);

#[derive(Clone, Debug, Default)]
pub struct AttemptCounter {
    last: u64,
}

impl AttemptCounter {
    pub fn next(&mut self) -> AttemptToken {
        self.last += 1;
        AttemptToken(self.last)
    }
}
