use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::checkout::states::{CheckoutEvent, CheckoutStage, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CheckoutTransitionError {
    #[error("invalid checkout transition from {stage:?} using event {event:?}")]
    InvalidTransition { stage: CheckoutStage, event: CheckoutEvent },
}

/// Checkout coordinator state machine. Stateless: callers own the current
/// stage and feed it back in.
#[derive(Clone, Debug, Default)]
pub struct CheckoutMachine;

impl CheckoutMachine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_stage(&self) -> CheckoutStage {
        CheckoutStage::Idle
    }

    pub fn apply(
        &self,
        current: CheckoutStage,
        event: CheckoutEvent,
    ) -> Result<TransitionOutcome, CheckoutTransitionError> {
        transition_checkout(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: CheckoutStage,
        event: CheckoutEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, CheckoutTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "checkout.transition_applied",
                        AuditCategory::Checkout,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "checkout.transition_rejected",
                        AuditCategory::Checkout,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

pub fn transition_checkout(
    current: CheckoutStage,
    event: CheckoutEvent,
) -> Result<TransitionOutcome, CheckoutTransitionError> {
    use CheckoutEvent::{
        AgentRepliedWithText, CheckoutAbandoned, CheckoutRequested, MintFailed,
        NextOrderRequested, PaymentCancelled, PaymentDeclined, PaymentFormRequested,
        PaymentSucceeded, ReceiptMinted, StartFailed,
    };
    use CheckoutStage::{AwaitingPayment, Cancelled, Completed, Finalizing, Idle, Initiated};

    let to = match (current, event) {
        (Idle, CheckoutRequested) | (Cancelled, CheckoutRequested) => Initiated,
        (Initiated, StartFailed) | (Initiated, CheckoutAbandoned) => Idle,
        (Initiated, AgentRepliedWithText) => Initiated,
        (Initiated, PaymentFormRequested) => AwaitingPayment,
        (AwaitingPayment, PaymentSucceeded) => Finalizing,
        (AwaitingPayment, PaymentDeclined) => AwaitingPayment,
        (AwaitingPayment, PaymentCancelled) => Cancelled,
        (Finalizing, AgentRepliedWithText) => Finalizing,
        (Finalizing, ReceiptMinted) => Completed,
        (Finalizing, MintFailed) => Idle,
        (Completed, NextOrderRequested) => Idle,
        _ => return Err(CheckoutTransitionError::InvalidTransition { stage: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event })
}
