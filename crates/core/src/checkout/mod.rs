pub mod engine;
pub mod states;

pub use engine::{transition_checkout, CheckoutMachine, CheckoutTransitionError};
pub use states::{AttemptCounter, AttemptToken, CheckoutEvent, CheckoutStage, TransitionOutcome};
