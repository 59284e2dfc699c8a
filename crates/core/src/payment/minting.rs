use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::transaction::TransactionId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintedReceipt {
    pub nft_url: String,
    pub explorer_url: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MintError {
    #[error("receipt minting failed: {0}")]
    Failed(String),
}

/// Mints a proof-of-purchase asset for a paid transaction.
#[async_trait]
pub trait ReceiptMinter: Send + Sync {
    async fn mint(
        &self,
        transaction_id: &TransactionId,
        order_summary: &str,
        total: Decimal,
    ) -> Result<MintedReceipt, MintError>;
}

#[derive(Clone, Debug)]
pub struct SimulatedMinter {
    latency: Duration,
}

impl Default for SimulatedMinter {
    fn default() -> Self {
        Self::new(Duration::from_millis(2500))
    }
}

impl SimulatedMinter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl ReceiptMinter for SimulatedMinter {
    async fn mint(
        &self,
        transaction_id: &TransactionId,
        order_summary: &str,
        total: Decimal,
    ) -> Result<MintedReceipt, MintError> {
        info!(
            event_name = "receipt.mint.started",
            transaction_id = %transaction_id.as_str(),
            order_summary,
            total = %total,
            "minting receipt"
        );
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let hash: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(|byte| char::from(byte).to_ascii_lowercase())
            .collect();
        let stamp = Utc::now().timestamp_millis();

        Ok(MintedReceipt {
            nft_url: format!("https://api.lorem.space/image/album?w=400&h=400&seed={stamp}"),
            explorer_url: format!("https://mock-explorer.dev/tx/0x{hash}{stamp}"),
        })
    }
}
