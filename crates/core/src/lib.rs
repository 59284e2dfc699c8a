pub mod audit;
pub mod checkout;
pub mod commerce;
pub mod config;
pub mod domain;
pub mod errors;
pub mod payment;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use checkout::{
    transition_checkout, AttemptCounter, AttemptToken, CheckoutEvent, CheckoutMachine,
    CheckoutStage, CheckoutTransitionError, TransitionOutcome,
};
pub use commerce::{
    best_price, cart_total, cheapest, cheapest_or_sentinel, is_acceptable_unit_price, CartLedger,
    CatalogLookup, StaticCatalog,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, LlmProvider};
pub use domain::cart::{CartItem, CartMutation};
pub use domain::product::{Product, ProductId, Supplier};
pub use domain::shopper::Shopper;
pub use domain::transaction::{ReceiptRecord, Transaction, TransactionId};
pub use errors::{ApplicationError, DomainError};
pub use payment::{
    validate_card, CardFields, CardValidationError, ChargeOutcome, DeclineReason, GatewayError,
    MintError, MintedReceipt, PaymentGateway, ReceiptMinter, SimulatedGateway, SimulatedMinter,
};
