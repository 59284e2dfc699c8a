use std::collections::HashMap;

use tokio::sync::RwLock;

use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::transaction::Transaction;

use super::{CartRepository, RepositoryError, TransactionRepository};

#[derive(Default)]
pub struct InMemoryCartRepository {
    carts: RwLock<HashMap<String, Vec<CartItem>>>,
}

#[async_trait::async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn load_cart(&self, user_id: &str) -> Result<Vec<CartItem>, RepositoryError> {
        let carts = self.carts.read().await;
        Ok(carts.get(user_id).cloned().unwrap_or_default())
    }

    async fn save_cart(&self, user_id: &str, items: &[CartItem]) -> Result<(), RepositoryError> {
        let mut carts = self.carts.write().await;
        carts.insert(user_id.to_string(), items.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<String, Vec<Transaction>>>,
}

#[async_trait::async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn load_transactions(&self, user_id: &str) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(user_id).cloned().unwrap_or_default())
    }

    async fn append_transaction(
        &self,
        user_id: &str,
        transaction: Transaction,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut transactions = self.transactions.write().await;
        let history = transactions.entry(user_id.to_string()).or_default();
        history.push(transaction);
        Ok(history.clone())
    }
}
