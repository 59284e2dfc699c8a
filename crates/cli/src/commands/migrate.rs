use agentcart_db::migrations::MIGRATOR;
use serde_json::json;

use crate::bootstrap::{open_store, BootstrapError};
use crate::commands::{prepare, CommandContext, CommandResult, RuntimeKind};

const COMMAND: &str = "migrate";

/// Brings the cart and purchase-history schema up to date.
pub fn run() -> CommandResult {
    let CommandContext { config, runtime } = match prepare(COMMAND, RuntimeKind::CurrentThread) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let opened = runtime.block_on(async {
        let pool = open_store(&config).await?;
        pool.close().await;
        Ok::<(), BootstrapError>(())
    });

    match opened {
        Ok(()) => CommandResult::success_with_data(
            COMMAND,
            "cart and purchase history schema is up to date",
            json!({
                "database_url": config.database.url,
                "known_migrations": MIGRATOR.iter().count(),
            }),
        ),
        Err(error) => {
            CommandResult::failure(COMMAND, error.error_class(), error.to_string(), error.exit_code())
        }
    }
}
