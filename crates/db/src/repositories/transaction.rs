use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::transaction::{Transaction, TransactionId};

use super::{RepositoryError, TransactionRepository};
use crate::DbPool;

pub struct SqlTransactionRepository {
    pool: DbPool,
}

impl SqlTransactionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at: String =
        row.try_get("occurred_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total: String =
        row.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let products_json: String =
        row.try_get("products_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let timestamp = DateTime::parse_from_rfc3339(&occurred_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{occurred_at}`: {e}")))?;
    let total = Decimal::from_str(&total)
        .map_err(|e| RepositoryError::Decode(format!("invalid total `{total}`: {e}")))?;
    let products: Vec<CartItem> = serde_json::from_str(&products_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid products payload: {e}")))?;

    Ok(Transaction { id: TransactionId(id), timestamp, products, total })
}

#[async_trait::async_trait]
impl TransactionRepository for SqlTransactionRepository {
    async fn load_transactions(&self, user_id: &str) -> Result<Vec<Transaction>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, occurred_at, total, products_json
             FROM purchase_transaction WHERE user_id = ? ORDER BY seq ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn append_transaction(
        &self,
        user_id: &str,
        transaction: Transaction,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let products_json = serde_json::to_string(&transaction.products)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO purchase_transaction (user_id, id, occurred_at, total, products_json)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(transaction.id.as_str())
        .bind(transaction.timestamp.to_rfc3339())
        .bind(transaction.total.to_string())
        .bind(products_json)
        .execute(&self.pool)
        .await?;

        self.load_transactions(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use agentcart_core::domain::cart::CartItem;
    use agentcart_core::domain::product::ProductId;
    use agentcart_core::domain::transaction::{Transaction, TransactionId};

    use super::SqlTransactionRepository;
    use crate::repositories::{RepositoryError, TransactionRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlTransactionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlTransactionRepository::new(pool)
    }

    fn transaction(id: &str) -> Transaction {
        Transaction {
            id: TransactionId(id.to_string()),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).single().expect("timestamp"),
            products: vec![CartItem {
                id: ProductId("prod_airpods_pro".to_string()),
                name: "Apple AirPods Pro".to_string(),
                price: Decimal::new(100, 0),
                image: String::new(),
                quantity: 2,
                supplier: "Walmart".to_string(),
            }],
            total: Decimal::new(200, 0),
        }
    }

    #[tokio::test]
    async fn append_returns_full_history_oldest_first() {
        let repo = setup().await;

        let after_first = repo.append_transaction("u-1", transaction("tx_1")).await.expect("first");
        assert_eq!(after_first, vec![transaction("tx_1")]);

        let after_second =
            repo.append_transaction("u-1", transaction("tx_2")).await.expect("second");
        let ids: Vec<&str> = after_second.iter().map(|tx| tx.id.as_str()).collect();
        assert_eq!(ids, vec!["tx_1", "tx_2"]);
        assert_eq!(after_second[1].total, Decimal::new(200, 0));
        assert_eq!(after_second[1].products[0].quantity, 2);
    }

    #[tokio::test]
    async fn histories_are_scoped_per_user() {
        let repo = setup().await;
        repo.append_transaction("u-1", transaction("tx_1")).await.expect("append");

        assert!(repo.load_transactions("u-2").await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn duplicate_transaction_id_is_rejected() {
        let repo = setup().await;
        repo.append_transaction("u-1", transaction("tx_1")).await.expect("append");

        let duplicate = repo.append_transaction("u-1", transaction("tx_1")).await;
        assert!(matches!(duplicate, Err(RepositoryError::Database(_))));
        assert_eq!(repo.load_transactions("u-1").await.expect("load").len(), 1);
    }
}
