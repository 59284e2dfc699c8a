use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::domain::transaction::TransactionId;
use crate::payment::card::{validate_card, CardFields, CardValidationError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { transaction_id: TransactionId },
    Declined { reason: DeclineReason },
}

/// Why a charge did not go through. The display text is shown to the user
/// verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeclineReason {
    #[error("{0}")]
    Invalid(String),
    #[error("Card was declined")]
    CardDeclined,
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Lost card")]
    LostCard,
    #[error("Stolen card")]
    StolenCard,
    #[error("Card has expired")]
    ExpiredCard,
    #[error("Incorrect CVC")]
    IncorrectCvc,
    #[error("Processing error")]
    ProcessingError,
}

impl From<CardValidationError> for DeclineReason {
    fn from(value: CardValidationError) -> Self {
        Self::Invalid(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, card: &CardFields) -> Result<ChargeOutcome, GatewayError>;
}

/// Test-mode gateway with a fixed table of card numbers.
#[derive(Clone, Debug)]
pub struct SimulatedGateway {
    latency: Duration,
    jitter: Duration,
    today: Option<NaiveDate>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500), Duration::from_millis(1000))
    }
}

impl SimulatedGateway {
    pub fn new(latency: Duration, jitter: Duration) -> Self {
        Self { latency, jitter, today: None }
    }

    /// Gateway that answers immediately.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Pins the date used for expiry checks.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.latency;
        }
        self.latency + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }

    fn decide(&self, card: &CardFields) -> ChargeOutcome {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        if let Err(error) = validate_card(card, today) {
            return ChargeOutcome::Declined { reason: error.into() };
        }

        let reason = match card.normalized_number().as_str() {
            "4000000000000002" => Some(DeclineReason::CardDeclined),
            "4000000000009995" => Some(DeclineReason::InsufficientFunds),
            "4000000000009987" => Some(DeclineReason::LostCard),
            "4000000000009979" => Some(DeclineReason::StolenCard),
            "4000000000000069" => Some(DeclineReason::ExpiredCard),
            "4000000000000127" => Some(DeclineReason::IncorrectCvc),
            "4000000000000119" => Some(DeclineReason::ProcessingError),
            _ => None,
        };

        match reason {
            Some(reason) => ChargeOutcome::Declined { reason },
            None => ChargeOutcome::Approved { transaction_id: new_transaction_id() },
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, card: &CardFields) -> Result<ChargeOutcome, GatewayError> {
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.decide(card);
        debug!(
            event_name = "payment.gateway.charge_simulated",
            card_last4 = %card.last4(),
            approved = matches!(outcome, ChargeOutcome::Approved { .. }),
            "simulated gateway charge resolved"
        );
        Ok(outcome)
    }
}

fn new_transaction_id() -> TransactionId {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect();
    TransactionId(format!("pi_{}_{suffix}", Utc::now().timestamp_millis()))
}
