use std::sync::Arc;

use agentcart_agent::{
    BackendError, LogNotifier, OpenAiCompatibleBackend, RuntimeDeps, RuntimeSettings,
};
use agentcart_core::audit::TracingAuditSink;
use agentcart_core::commerce::StaticCatalog;
use agentcart_core::config::AppConfig;
use agentcart_core::domain::shopper::Shopper;
use agentcart_core::payment::{SimulatedGateway, SimulatedMinter};
use agentcart_db::{
    connect_with_settings, migrations, CartRepository, DbPool, InMemoryCartRepository,
    InMemoryTransactionRepository, SqlCartRepository, SqlTransactionRepository,
    TransactionRepository,
};
use thiserror::Error;
use tracing::info;

/// Everything a chat session needs, wired from configuration.
pub struct Services {
    pub deps: RuntimeDeps,
    pub settings: RuntimeSettings,
    pub db_pool: Option<DbPool>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl BootstrapError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::DatabaseConnect(_) => "db_connectivity",
            Self::Migration(_) => "migration",
            Self::Backend(_) => "llm_backend",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Migration(_) => 5,
            Self::DatabaseConnect(_) | Self::Backend(_) => 4,
        }
    }
}

/// Connects to the configured SQLite database and applies pending migrations.
pub async fn open_store(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        url = %config.database.url,
        "database connected and migrated"
    );
    Ok(pool)
}

/// Guests get in-memory storage; durable shoppers are backed by SQLite with
/// migrations applied on connect.
pub async fn build_services(
    config: &AppConfig,
    shopper: &Shopper,
) -> Result<Services, BootstrapError> {
    let backend = OpenAiCompatibleBackend::from_config(&config.llm)?;
    info!(
        event_name = "system.bootstrap.backend_ready",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        endpoint = %backend.endpoint(),
        "agent backend configured"
    );

    let (carts, transactions, db_pool): (
        Arc<dyn CartRepository>,
        Arc<dyn TransactionRepository>,
        Option<DbPool>,
    ) = if shopper.is_anonymous {
        (
            Arc::new(InMemoryCartRepository::default()),
            Arc::new(InMemoryTransactionRepository::default()),
            None,
        )
    } else {
        let pool = open_store(config).await?;
        (
            Arc::new(SqlCartRepository::new(pool.clone())),
            Arc::new(SqlTransactionRepository::new(pool.clone())),
            Some(pool),
        )
    };

    let deps = RuntimeDeps {
        backend: Arc::new(backend),
        catalog: Arc::new(StaticCatalog::demo()),
        gateway: Arc::new(SimulatedGateway::new(config.payment.latency(), config.payment.jitter())),
        minter: Arc::new(SimulatedMinter::new(config.minting.latency())),
        carts,
        transactions,
        notifier: Arc::new(LogNotifier),
        audit: Arc::new(TracingAuditSink),
    };

    Ok(Services { deps, settings: RuntimeSettings::from(&config.agent), db_pool })
}

#[cfg(test)]
mod tests {
    use agentcart_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use agentcart_core::domain::shopper::Shopper;

    use super::build_services;

    fn config() -> AppConfig {
        let mut config = AppConfig::load(LoadOptions {
            config_path: None,
            require_file: false,
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
        })
        .expect("config");
        config.database.max_connections = 1;
        config
    }

    #[tokio::test]
    async fn guests_use_in_memory_storage() {
        let services = build_services(&config(), &Shopper::guest("guest-1")).await.expect("services");
        assert!(services.db_pool.is_none());
        assert_eq!(services.settings.max_search_rounds, 5);
    }

    #[tokio::test]
    async fn durable_shoppers_get_a_migrated_database() {
        let services =
            build_services(&config(), &Shopper::registered("user-1", None)).await.expect("services");
        let pool = services.db_pool.expect("pool");
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'cart_item'",
        )
        .fetch_all(&pool)
        .await
        .expect("query");
        assert_eq!(tables.len(), 1);
    }
}
