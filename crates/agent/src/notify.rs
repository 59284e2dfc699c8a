use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use agentcart_core::domain::transaction::{ReceiptRecord, Transaction};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("order notification failed: {0}")]
    Delivery(String),
}

/// Everything a confirmation message needs about a completed order.
#[derive(Clone, Debug)]
pub struct OrderConfirmation {
    pub shopper_uid: String,
    pub salutation: String,
    pub email: Option<String>,
    pub transaction: Transaction,
    pub receipt: ReceiptRecord,
}

/// Called once per completed order, after the transaction is recorded.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn order_completed(&self, confirmation: &OrderConfirmation) -> Result<(), NotifyError>;
}

/// Writes the confirmation as a structured log event.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn order_completed(&self, confirmation: &OrderConfirmation) -> Result<(), NotifyError> {
        info!(
            event_name = "order.completed",
            shopper_uid = %confirmation.shopper_uid,
            salutation = %confirmation.salutation,
            email = confirmation.email.as_deref().unwrap_or("-"),
            transaction_id = %confirmation.transaction.id.as_str(),
            total = %confirmation.transaction.total,
            items = confirmation.transaction.products.len(),
            explorer_url = %confirmation.receipt.explorer_url,
            "order confirmation issued"
        );
        Ok(())
    }
}
