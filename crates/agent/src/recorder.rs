use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::shopper::Shopper;
use agentcart_core::domain::transaction::{Transaction, TransactionId};
use agentcart_db::{RepositoryError, TransactionRepository};

/// Purchase history for one shopper.
///
/// Guests keep their history in memory for the life of the runtime; durable
/// shoppers append through the repository and adopt the stored history.
pub struct TransactionRecorder {
    repository: Option<Arc<dyn TransactionRepository>>,
    history: Vec<Transaction>,
}

impl TransactionRecorder {
    pub fn for_shopper(shopper: &Shopper, repository: Arc<dyn TransactionRepository>) -> Self {
        let repository = (!shopper.is_anonymous).then_some(repository);
        Self { repository, history: Vec::new() }
    }

    pub fn is_durable(&self) -> bool {
        self.repository.is_some()
    }

    pub async fn load(&mut self, user_id: &str) -> Result<&[Transaction], RepositoryError> {
        if let Some(repository) = &self.repository {
            self.history = repository.load_transactions(user_id).await?;
        }
        Ok(&self.history)
    }

    /// Records one completed purchase and returns the full history, oldest
    /// first. On a repository error the in-memory history is unchanged.
    pub async fn commit(
        &mut self,
        user_id: &str,
        transaction_id: TransactionId,
        products: Vec<CartItem>,
        total: Decimal,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let transaction =
            Transaction { id: transaction_id, timestamp: Utc::now(), products, total };
        let transaction_id = transaction.id.clone();

        match &self.repository {
            Some(repository) => {
                self.history = repository.append_transaction(user_id, transaction).await?;
            }
            None => self.history.push(transaction),
        }

        info!(
            event_name = "transaction.recorded",
            user_id,
            transaction_id = %transaction_id.as_str(),
            total = %total,
            durable = self.is_durable(),
            history_len = self.history.len(),
            "transaction recorded"
        );
        Ok(self.history.clone())
    }

    pub fn history(&self) -> &[Transaction] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use agentcart_core::domain::cart::CartItem;
    use agentcart_core::domain::product::ProductId;
    use agentcart_core::domain::shopper::Shopper;
    use agentcart_core::domain::transaction::TransactionId;
    use agentcart_db::{InMemoryTransactionRepository, TransactionRepository};

    use super::TransactionRecorder;

    fn widget() -> CartItem {
        CartItem {
            id: ProductId("prod_widget".to_string()),
            name: "Widget".to_string(),
            price: Decimal::from(100),
            image: String::new(),
            quantity: 2,
            supplier: "Acme".to_string(),
        }
    }

    #[tokio::test]
    async fn guest_history_stays_in_memory() {
        let repository = Arc::new(InMemoryTransactionRepository::default());
        let mut recorder =
            TransactionRecorder::for_shopper(&Shopper::guest("guest-1"), repository.clone());

        let history = recorder
            .commit("guest-1", TransactionId("tx_1".to_string()), vec![widget()], Decimal::from(200))
            .await
            .expect("commit");

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total, Decimal::from(200));
        assert!(repository.load_transactions("guest-1").await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn durable_history_appends_oldest_first() {
        let repository = Arc::new(InMemoryTransactionRepository::default());
        let shopper = Shopper::registered("user-1", None);
        let mut recorder = TransactionRecorder::for_shopper(&shopper, repository.clone());

        for id in ["tx_1", "tx_2"] {
            recorder
                .commit("user-1", TransactionId(id.to_string()), vec![widget()], Decimal::from(200))
                .await
                .expect("commit");
        }

        let mut reloaded = TransactionRecorder::for_shopper(&shopper, repository);
        let ids: Vec<String> = reloaded
            .load("user-1")
            .await
            .expect("load")
            .iter()
            .map(|tx| tx.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["tx_1", "tx_2"]);
    }
}
