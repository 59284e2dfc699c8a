use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::product::ProductId;

use super::{CartRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCartRepository {
    pool: DbPool,
}

impl SqlCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<CartItem, RepositoryError> {
    let product_id: String = decode(row.try_get("product_id"))?;
    let name: String = decode(row.try_get("name"))?;
    let price_str: String = decode(row.try_get("price"))?;
    let image: String = decode(row.try_get("image"))?;
    let quantity: i64 = decode(row.try_get("quantity"))?;
    let supplier: String = decode(row.try_get("supplier"))?;

    let price = Decimal::from_str(&price_str)
        .map_err(|e| RepositoryError::Decode(format!("invalid price `{price_str}`: {e}")))?;
    let quantity = u32::try_from(quantity)
        .ok()
        .filter(|quantity| *quantity > 0)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid quantity {quantity}")))?;

    Ok(CartItem { id: ProductId(product_id), name, price, image, quantity, supplier })
}

#[async_trait::async_trait]
impl CartRepository for SqlCartRepository {
    async fn load_cart(&self, user_id: &str) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id, name, price, image, quantity, supplier
             FROM cart_item WHERE user_id = ? ORDER BY position ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    async fn save_cart(&self, user_id: &str, items: &[CartItem]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_item WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO cart_item (user_id, product_id, position, name, price, image,
                                        quantity, supplier)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(item.id.as_str())
            .bind(position as i64)
            .bind(&item.name)
            .bind(item.price.to_string())
            .bind(&item.image)
            .bind(i64::from(item.quantity))
            .bind(&item.supplier)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
