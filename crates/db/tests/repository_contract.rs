use chrono::Utc;
use rust_decimal::Decimal;

use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::product::ProductId;
use agentcart_core::domain::transaction::{Transaction, TransactionId};
use agentcart_db::{
    connect_with_settings, migrations, CartRepository, InMemoryCartRepository,
    InMemoryTransactionRepository, SqlCartRepository, SqlTransactionRepository,
    TransactionRepository,
};

type ContractResult<T = ()> = Result<T, String>;

macro_rules! require_eq {
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

fn item(id: &str, cents: i64, quantity: u32) -> CartItem {
    CartItem {
        id: ProductId(id.to_string()),
        name: format!("Product {id}"),
        price: Decimal::new(cents, 2),
        image: String::new(),
        quantity,
        supplier: "Target".to_string(),
    }
}

async fn cart_contract(repo: &dyn CartRepository) -> ContractResult {
    let first = vec![item("prod_x", 1_050, 1), item("prod_y", 999, 2)];
    repo.save_cart("shopper", &first).await.map_err(|e| e.to_string())?;
    let loaded = repo.load_cart("shopper").await.map_err(|e| e.to_string())?;
    require_eq!(loaded, first, "cart should round-trip in order");

    repo.save_cart("shopper", &[]).await.map_err(|e| e.to_string())?;
    let cleared = repo.load_cart("shopper").await.map_err(|e| e.to_string())?;
    require_eq!(cleared.len(), 0, "empty save should clear the cart");
    Ok(())
}

async fn transaction_contract(repo: &dyn TransactionRepository) -> ContractResult {
    let transaction = Transaction {
        id: TransactionId("pi_1_abc".to_string()),
        timestamp: Utc::now(),
        products: vec![item("prod_x", 1_050, 2)],
        total: Decimal::new(2_100, 2),
    };

    let history = repo
        .append_transaction("shopper", transaction.clone())
        .await
        .map_err(|e| e.to_string())?;
    require_eq!(history.len(), 1, "append should return the updated history");
    require_eq!(history[0].total, transaction.total, "total should be preserved exactly");
    require_eq!(history[0].products, transaction.products, "snapshot should be preserved");

    let loaded = repo.load_transactions("shopper").await.map_err(|e| e.to_string())?;
    require_eq!(loaded.len(), 1, "history should be loadable after append");
    Ok(())
}

#[tokio::test]
async fn in_memory_repositories_satisfy_contract() -> ContractResult {
    cart_contract(&InMemoryCartRepository::default()).await?;
    transaction_contract(&InMemoryTransactionRepository::default()).await
}

#[tokio::test]
async fn sqlite_repositories_satisfy_contract() -> ContractResult {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.map_err(|e| e.to_string())?;
    migrations::run_pending(&pool).await.map_err(|e| e.to_string())?;

    cart_contract(&SqlCartRepository::new(pool.clone())).await?;
    transaction_contract(&SqlTransactionRepository::new(pool)).await
}
