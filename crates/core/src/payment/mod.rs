pub mod card;
pub mod gateway;
pub mod minting;

pub use card::{validate_card, CardFields, CardValidationError};
pub use gateway::{
    ChargeOutcome, DeclineReason, GatewayError, PaymentGateway, SimulatedGateway,
};
pub use minting::{MintError, MintedReceipt, ReceiptMinter, SimulatedMinter};
