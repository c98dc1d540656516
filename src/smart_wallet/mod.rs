//! Component J: Smart-Wallet Sync (spec §4.I). Runs the periodic polling
//! backup on a fixed interval; the webhook-instant path is driven directly
//! from `webhook_api` and shares the same `ingestion` functions.

pub mod ingestion;
pub mod shareable;

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, instrument};

use crate::config::Config;
use crate::db::repository::Repository;
use crate::smart_wallet::ingestion::{run_polling_cycle, IngestionCounters};
use crate::smart_wallet::shareable::FilterStats;
use crate::store::MarketStore;

pub struct SmartWalletSync {
    repo: Arc<dyn Repository>,
    store: Arc<MarketStore>,
    interval: std::time::Duration,
    counters: Arc<IngestionCounters>,
}

impl SmartWalletSync {
    pub fn new(repo: Arc<dyn Repository>, store: Arc<MarketStore>, cfg: &Config) -> Self {
        Self {
            repo,
            store,
            interval: cfg.smart_sync_interval(),
            counters: Arc::new(IngestionCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<IngestionCounters> {
        self.counters.clone()
    }

    #[instrument(name = "smart_wallet_sync", skip(self))]
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut since = chrono::Utc::now() - chrono::Duration::hours(1);

        loop {
            ticker.tick().await;
            let mut stats = FilterStats::default();
            match run_polling_cycle(since, self.repo.as_ref(), self.store.as_ref(), &mut stats).await {
                Ok(new_since) => {
                    since = new_since;
                    info!(
                        processed = stats.processed,
                        qualified = stats.qualified,
                        "smart-wallet-sync polling cycle complete"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "smart-wallet-sync polling cycle failed");
                }
            }
        }
    }
}
