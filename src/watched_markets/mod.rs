//! Component F: Watched-Markets Controller (spec §4.F). Runs every
//! `T_watch`, computing the union of markets with an active user position,
//! reconciling the `watched_markets` table, and nudging the streamer
//! (component C) to refresh its subscription set. Scheduled-loop shape
//! follows `vault/pool.rs`/`vault_db.rs`; the reconciliation logic itself
//! has no direct precedent elsewhere in this crate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::repository::Repository;
use crate::error::CoreResult;
use crate::ids::to_condition_id;
use crate::models::{MarketStatus, WatchedMarket};
use crate::positions::{PositionCache, PositionsClient};
use crate::store::MarketStore;
use crate::streamer::WatchedSet;

/// Skip the deletion phase of a cycle if at least this fraction of
/// per-wallet position fetches failed, to avoid mass-deletion oscillation
/// on a partial outage (spec §4.F "Failure mode").
const MAX_FAILED_FETCH_RATIO: f64 = 0.20;

/// The inactive-market sweep (spec §4.F, "Hourly within this loop") runs
/// once every this many regular cycles, bounding it to roughly hourly at
/// the default 60s `T_watch`.
const SWEEP_EVERY_N_CYCLES: u64 = 60;

/// Inactive-market sweep scope: "the 50 most recent users" (spec §4.F).
const SWEEP_RECENT_USER_LIMIT: usize = 50;

pub struct WatchedMarketsController {
    repo: Arc<dyn Repository>,
    store: Arc<MarketStore>,
    positions_client: Arc<dyn PositionsClient>,
    position_cache: Arc<PositionCache>,
    watched_set: WatchedSet,
    interval: Duration,
    /// Opt-in augmentation (spec §4.F step 3): also watch markets with
    /// recent smart-wallet activity even absent a tracked user position.
    augment_with_smart_wallet_activity: bool,
}

impl WatchedMarketsController {
    pub fn new(
        cfg: &Config,
        repo: Arc<dyn Repository>,
        store: Arc<MarketStore>,
        positions_client: Arc<dyn PositionsClient>,
        position_cache: Arc<PositionCache>,
        watched_set: WatchedSet,
    ) -> Self {
        Self {
            repo,
            store,
            positions_client,
            position_cache,
            watched_set,
            interval: cfg.watched_markets_interval(),
            augment_with_smart_wallet_activity: false,
        }
    }

    pub async fn run(&self, on_mutation: impl Fn() + Send + Sync) -> CoreResult<()> {
        let mut cycle: u64 = 0;
        loop {
            if let Err(e) = self.run_cycle(&on_mutation).await {
                warn!(error = %e, "watched-markets cycle failed");
            }
            if cycle % SWEEP_EVERY_N_CYCLES == 0 {
                if let Err(e) = self.inactive_market_sweep().await {
                    warn!(error = %e, "inactive-market sweep failed");
                }
            }
            cycle += 1;
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn run_cycle(&self, on_mutation: &(impl Fn() + Send + Sync)) -> CoreResult<()> {
        let wallets = self.repo.all_tracked_wallets().await?;
        let (required, affected_users, failed_ratio) = self.compute_required(&wallets).await;

        let mut mutated = false;

        let before: HashSet<String> =
            self.repo.list_watched_markets().await?.into_iter().map(|wm| wm.condition_id).collect();

        for (condition_id, (market_id, owners)) in &required {
            let wm = WatchedMarket {
                market_id: market_id.clone(),
                condition_id: condition_id.clone(),
                active_positions: *owners as i64,
                last_position_at: chrono::Utc::now(),
            };
            self.repo.upsert_watched_market(&wm).await?;
            if !before.contains(condition_id) {
                mutated = true;
            }
        }

        let current = self.repo.list_watched_markets().await?;
        if failed_ratio >= MAX_FAILED_FETCH_RATIO {
            warn!(
                failed_ratio,
                "skipping watched-markets deletions this cycle (too many failed wallet fetches)"
            );
        } else {
            for wm in &current {
                let still_required = required.contains_key(&wm.condition_id);
                let market_terminal = self
                    .store
                    .get_market(&wm.market_id, true)
                    .map(|m| m.status.is_terminal())
                    .unwrap_or(false);
                if !still_required || market_terminal {
                    self.repo.delete_watched_market(&wm.market_id).await?;
                    mutated = true;
                }
            }
        }

        self.rebuild_watched_set().await?;

        if mutated {
            for user in &affected_users {
                self.position_cache.invalidate(user);
            }
            on_mutation();
            debug!(required = required.len(), "watched-markets reconciliation mutated the set");
        }

        Ok(())
    }

    /// Returns `(condition_id -> (market_id, owner_count), affected wallet
    /// addresses, failed_fetch_ratio)`.
    async fn compute_required(
        &self,
        wallets: &[String],
    ) -> (HashMap<String, (String, usize)>, HashSet<String>, f64) {
        let uncached: Vec<&String> = wallets
            .iter()
            .filter(|w| self.position_cache.get(w).is_none())
            .collect();

        let fetches = uncached.iter().map(|w| {
            let client = self.positions_client.clone();
            let wallet = (*w).clone();
            async move { (wallet.clone(), client.fetch_positions(&wallet).await) }
        });
        let results = join_all(fetches).await;

        let mut failed = 0usize;
        for (wallet, result) in results {
            match result {
                Ok(positions) => self.position_cache.store(&wallet, positions),
                Err(e) => {
                    failed += 1;
                    warn!(wallet, error = %e, "failed to fetch positions for wallet");
                }
            }
        }
        let failed_ratio = if uncached.is_empty() { 0.0 } else { failed as f64 / uncached.len() as f64 };

        let mut required: HashMap<String, (String, usize)> = HashMap::new();
        let mut owners: HashMap<String, HashSet<String>> = HashMap::new();
        let mut affected_users = HashSet::new();

        for wallet in wallets {
            let Some(positions) = self.position_cache.get(wallet) else { continue };
            for p in positions.iter() {
                if p.is_dust() {
                    continue;
                }
                let terminal = self
                    .store
                    .get_market(&p.market_id, true)
                    .map(|m| m.status.is_terminal())
                    .unwrap_or(false);
                if terminal {
                    continue;
                }
                let condition_id = self
                    .store
                    .get_market(&p.market_id, true)
                    .map(|m| m.condition_id)
                    .or_else(|| to_condition_id(&p.market_id).ok().map(|c| c.0))
                    .unwrap_or_else(|| p.market_id.clone());

                owners.entry(condition_id.clone()).or_default().insert(wallet.clone());
                required.entry(condition_id).or_insert_with(|| (p.market_id.clone(), 0));
                affected_users.insert(wallet.clone());
            }
        }
        for (condition_id, (_, count)) in required.iter_mut() {
            *count = owners.get(condition_id).map(HashSet::len).unwrap_or(0);
        }

        (required, affected_users, failed_ratio)
    }

    /// Rebuilds the streamer's desired subscription set (`token_id ->
    /// market_id`) from the current `watched_markets` table, using each
    /// market's primary (index-1/YES) token per the binary-market
    /// convention documented in `store::live_quote`.
    async fn rebuild_watched_set(&self) -> CoreResult<()> {
        let watched = self.repo.list_watched_markets().await?;
        let mut desired = HashMap::new();
        for wm in watched {
            if let Some(market) = self.store.get_market(&wm.market_id, false) {
                if let Some(token_id) = market.clob_token_ids.get(1).or_else(|| market.clob_token_ids.first()) {
                    desired.insert(token_id.clone(), wm.market_id.clone());
                }
            }
        }
        self.watched_set.store(Arc::new(desired));
        Ok(())
    }

    /// Hourly sweep (spec §4.F): for the 50 most recent users, recompute
    /// `required` and delete any watched-markets row not in it, independent
    /// of the failed-fetch guard (this path is explicitly a belt-and-braces
    /// cleanup, not the primary reconciliation).
    async fn inactive_market_sweep(&self) -> CoreResult<()> {
        info!("running inactive-market sweep");
        let mut wallets = self.repo.all_tracked_wallets().await?;
        wallets.truncate(SWEEP_RECENT_USER_LIMIT);

        let (required, _, _) = self.compute_required(&wallets).await;
        let current = self.repo.list_watched_markets().await?;
        for wm in current {
            if !required.contains_key(&wm.condition_id) {
                self.repo.delete_watched_market(&wm.market_id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_ratio_threshold_matches_spec() {
        assert!((MAX_FAILED_FETCH_RATIO - 0.20).abs() < 1e-9);
    }
}
