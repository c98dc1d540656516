//! Component B: Market Poller (spec §4.B). Alternates a fast discovery
//! cycle with a periodic exhaustive backfill, upserting into the shared
//! `MarketStore` (component A). Cycle/backoff shape follows
//! `scrapers/dome_tracker.rs` (rate limiting) and
//! `scrapers/polymarket_gamma.rs` (the REST surface itself, see
//! `gamma_client.rs`).

pub mod gamma_client;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::MarketStatus;
use crate::poller::gamma_client::{GammaClient, GammaOrder};
use crate::store::MarketStore;

const PAGE_SIZE: u32 = 100;
const DISCOVERY_PAGE_BUDGET: u32 = 5;
const BACKFILL_PAGE_CAP: u32 = 500;
const CONSECUTIVE_EMPTY_PAGE_LIMIT: u32 = 2;
const KEYWORD_PAGE_BUDGET: u32 = 3;
const EXPIRED_RECHECK_LIMIT: usize = 10;
const INTER_PAGE_DELAY: Duration = Duration::from_millis(350);
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(300);

pub struct MarketPoller {
    client: GammaClient,
    store: Arc<MarketStore>,
    fast_interval: Duration,
    keyword_interval: Duration,
    complete_every_n_cycles: u64,
}

impl MarketPoller {
    pub fn new(cfg: &Config, store: Arc<MarketStore>) -> crate::error::CoreResult<Self> {
        Ok(Self {
            client: GammaClient::new(cfg.gamma_api_url.clone())?,
            store,
            fast_interval: Duration::from_secs(cfg.fast_poll_secs),
            keyword_interval: Duration::from_secs(cfg.keyword_poll_secs),
            complete_every_n_cycles: cfg.complete_poll_cycles,
        })
    }

    /// Runs forever. Never returns `Err` for anything but a configuration
    /// failure; upstream problems are logged and retried with backoff, per
    /// spec §4.B ("never terminates the poller process"). Three cadences
    /// share one loop: the fast cycle on every tick, the "keyword" cycle
    /// (a standalone recency-ordered pass, distinct from the volume-ordered
    /// fast cycle and the full recency backfill) on its own, longer timer,
    /// and the exhaustive backfill every `complete_poll_cycles` ticks.
    pub async fn run(&self) -> crate::error::CoreResult<()> {
        let mut cycle: u64 = 0;
        let mut backoff = BACKOFF_MIN;
        let mut next_keyword_run = Instant::now() + self.keyword_interval;

        loop {
            let is_complete_cycle = cycle > 0 && cycle % self.complete_every_n_cycles == 0;
            let result = if is_complete_cycle {
                self.run_complete_cycle().await
            } else {
                self.run_fast_cycle().await
            };

            match result {
                Ok(upserted) => {
                    backoff = BACKOFF_MIN;
                    debug!(cycle, complete = is_complete_cycle, upserted, "poll cycle complete");
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "poll cycle failed, backing off");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
                Err(e) => {
                    warn!(error = %e, "poll cycle failed with non-retryable error, skipping");
                }
            }

            if Instant::now() >= next_keyword_run {
                match self.run_keyword_cycle().await {
                    Ok(upserted) => debug!(upserted, "keyword cycle complete"),
                    Err(e) => warn!(error = %e, "keyword cycle failed, will retry next interval"),
                }
                next_keyword_run = Instant::now() + self.keyword_interval;
            }

            cycle += 1;
            sleep(self.fast_interval).await;
        }
    }

    /// Finds new markets (paginating by volume) up to a bounded page
    /// budget; upserts only new-to-store markets plus refreshes the
    /// top-N (page 0) active markets' metadata.
    async fn run_fast_cycle(&self) -> crate::error::CoreResult<usize> {
        let mut upserted = 0usize;
        for page in 0..DISCOVERY_PAGE_BUDGET {
            let offset = page * PAGE_SIZE;
            let markets = self.client.list_markets_page(GammaOrder::Volume, PAGE_SIZE, offset).await?;
            if markets.is_empty() {
                break;
            }
            for dto in markets {
                let is_new = self.store.get_market(&dto_id(&dto), true).is_none();
                if is_new || page == 0 {
                    match dto.into_market() {
                        Ok(market) => {
                            self.store.upsert_market(market);
                            upserted += 1;
                        }
                        Err(e) => warn!(error = %e, "skipping unparsable gamma market"),
                    }
                }
            }
            sleep(INTER_PAGE_DELAY).await;
        }
        upserted += self.recheck_expired_markets().await;
        Ok(upserted)
    }

    /// Opportunistically re-fetches a handful of active markets whose
    /// `end_date` has passed, since Gamma's own `active`/`closed` flags lag
    /// the on-chain resolution. Best-effort: lookup failures are logged and
    /// skipped rather than surfaced, so one bad slug can't stall discovery.
    async fn recheck_expired_markets(&self) -> usize {
        let now = chrono::Utc::now();
        let expired: Vec<_> = self
            .store
            .list_active()
            .into_iter()
            .filter(|m| m.end_date.map(|d| d < now).unwrap_or(false))
            .take(EXPIRED_RECHECK_LIMIT)
            .collect();

        let mut refreshed = 0usize;
        for market in expired {
            match self.client.lookup_by_slug(&market.slug).await {
                Ok(Some(dto)) => match dto.into_market() {
                    Ok(updated) => {
                        self.store.upsert_market(updated);
                        refreshed += 1;
                    }
                    Err(e) => warn!(market_id = %market.id, error = %e, "skipping unparsable gamma market (expiry recheck)"),
                },
                Ok(None) => debug!(market_id = %market.id, slug = %market.slug, "expiry recheck: slug no longer found"),
                Err(e) => warn!(market_id = %market.id, error = %e, "expiry recheck lookup failed"),
            }
            sleep(INTER_PAGE_DELAY).await;
        }
        refreshed
    }

    /// Standalone recency-ordered discovery pass on its own cadence,
    /// independent of the volume-ordered fast cycle and the exhaustive
    /// recency backfill: catches markets the volume-ordered pass is slow to
    /// surface because they haven't accumulated volume yet.
    async fn run_keyword_cycle(&self) -> crate::error::CoreResult<usize> {
        let mut upserted = 0usize;
        for page in 0..KEYWORD_PAGE_BUDGET {
            let offset = page * PAGE_SIZE;
            let markets = self.client.list_markets_page(GammaOrder::Recency, PAGE_SIZE, offset).await?;
            if markets.is_empty() {
                break;
            }
            for dto in markets {
                match dto.into_market() {
                    Ok(market) => {
                        self.store.upsert_market(market);
                        upserted += 1;
                    }
                    Err(e) => warn!(error = %e, "skipping unparsable gamma market (keyword cycle)"),
                }
            }
            sleep(INTER_PAGE_DELAY).await;
        }
        Ok(upserted)
    }

    /// Exhaustive pagination bounded by a hard page cap and
    /// consecutive-empty-page termination; upserts every matching market.
    async fn run_complete_cycle(&self) -> crate::error::CoreResult<usize> {
        info!("starting complete backfill cycle");
        let mut upserted = 0usize;
        let mut empty_pages = 0u32;

        for page in 0..BACKFILL_PAGE_CAP {
            let offset = page * PAGE_SIZE;
            let markets = self
                .client
                .list_markets_page(GammaOrder::Recency, PAGE_SIZE, offset)
                .await?;

            if markets.is_empty() {
                empty_pages += 1;
                if empty_pages >= CONSECUTIVE_EMPTY_PAGE_LIMIT {
                    break;
                }
                sleep(INTER_PAGE_DELAY).await;
                continue;
            }
            empty_pages = 0;

            for dto in markets {
                match dto.into_market() {
                    Ok(market) => {
                        self.store.upsert_market(market);
                        upserted += 1;
                    }
                    Err(e) => warn!(error = %e, "skipping unparsable gamma market (backfill)"),
                }
            }
            sleep(INTER_PAGE_DELAY).await;
        }

        info!(upserted, "complete backfill cycle finished");
        Ok(upserted)
    }
}

fn dto_id(dto: &gamma_client::GammaMarketDto) -> String {
    dto.id.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_names_match_model() {
        assert!(MarketStatus::Resolved.is_terminal());
        assert!(MarketStatus::Cancelled.is_terminal());
        assert!(!MarketStatus::Active.is_terminal());
    }
}
