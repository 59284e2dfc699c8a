use thiserror::Error;

use crate::checkout::CheckoutTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    CheckoutTransition(#[from] CheckoutTransitionError),
    #[error("checkout refused: {0}")]
    CheckoutRefused(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("agent backend failure: {0}")]
    Backend(String),
    #[error("agent turn had no usable arguments")]
    MalformedTurn,
    #[error("checkout start failure: {0}")]
    CheckoutStart(String),
    #[error("order finalization failure: {0}")]
    Finalization(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Text shown to the shopper as a system message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Domain(DomainError::CheckoutRefused(reason)) => reason.clone(),
            Self::Domain(_) => "That action isn't available right now.".to_owned(),
            Self::Backend(_) | Self::Integration(_) => {
                "Sorry, an unexpected error occurred. Please try again.".to_owned()
            }
            Self::MalformedTurn => {
                "Sorry, I couldn't make sense of that cart change. Please try again.".to_owned()
            }
            Self::CheckoutStart(_) => {
                "Could not start the payment process. Please try again.".to_owned()
            }
            Self::Finalization(_) => "There was an error finalizing your order after payment. \
                 Please retry or contact support."
                .to_owned(),
            Self::Persistence(_) => {
                "Your changes could not be saved. Please try again shortly.".to_owned()
            }
            Self::Configuration(_) => "An unexpected internal error occurred.".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::checkout::{CheckoutEvent, CheckoutStage, CheckoutTransitionError};
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn backend_failure_uses_generic_apology() {
        let error = ApplicationError::Backend("timeout".to_owned());
        assert_eq!(error.user_message(), "Sorry, an unexpected error occurred. Please try again.");
    }

    #[test]
    fn refused_checkout_surfaces_reason_verbatim() {
        let error = ApplicationError::from(DomainError::CheckoutRefused(
            "Your cart is empty.".to_owned(),
        ));
        assert_eq!(error.user_message(), "Your cart is empty.");
    }

    #[test]
    fn transition_error_converts_through_domain() {
        let transition = CheckoutTransitionError::InvalidTransition {
            stage: CheckoutStage::Idle,
            event: CheckoutEvent::ReceiptMinted,
        };
        let error = ApplicationError::from(DomainError::from(transition));
        assert!(matches!(error, ApplicationError::Domain(DomainError::CheckoutTransition(_))));
        assert_eq!(error.user_message(), "That action isn't available right now.");
    }

    #[test]
    fn finalization_failure_mentions_support() {
        let message = ApplicationError::Finalization("mint offline".to_owned()).user_message();
        assert!(message.contains("contact support"));
    }
}
