use async_trait::async_trait;
use thiserror::Error;

use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::transaction::Transaction;

pub mod cart;
pub mod memory;
pub mod transaction;

pub use cart::SqlCartRepository;
pub use memory::{InMemoryCartRepository, InMemoryTransactionRepository};
pub use transaction::SqlTransactionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable per-shopper cart. `save_cart` replaces the stored cart wholesale.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn load_cart(&self, user_id: &str) -> Result<Vec<CartItem>, RepositoryError>;
    async fn save_cart(&self, user_id: &str, items: &[CartItem]) -> Result<(), RepositoryError>;
}

/// Append-only purchase history, oldest first.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn load_transactions(&self, user_id: &str) -> Result<Vec<Transaction>, RepositoryError>;

    /// Appends and returns the full updated history.
    async fn append_transaction(
        &self,
        user_id: &str,
        transaction: Transaction,
    ) -> Result<Vec<Transaction>, RepositoryError>;
}
