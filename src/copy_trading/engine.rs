//! Component I: Copy-Trading Engine (spec §4.H). Per-follower serialized
//! mirror execution, shaped around `vault/trade_executor.rs`'s
//! `ExecutionAdapter` seam and per-account serialization pattern.
//!
//! Simplification carried from spec.md §1's Non-goals ("Credential storage
//! & encryption... wallet generation" is out of scope): one
//! `CopyTradingEngine` is wired to a single `ExecutionAdapter` representing
//! the account this process trades under. Multi-custody fan-out across
//! many distinct follower wallets is an onboarding/credential-management
//! concern this core does not own; see DESIGN.md.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::copy_trading::leader;
use crate::copy_trading::sizing::{size_copy_trade, SizingDecision};
use crate::db::repository::Repository;
use crate::error::{CoreError, CoreResult};
use crate::exchange::{ExecutionAdapter, OrderRequest, OrderSide, TimeInForce};
use crate::models::{AllocationMode, CopyAllocation, LeaderTrade, Side};
use crate::notify;
use crate::store::MarketStore;

pub struct CopyTradingEngine {
    repo: Arc<dyn Repository>,
    store: Arc<MarketStore>,
    exchange: Arc<dyn ExecutionAdapter>,
    min_copy_amount_usd: f64,
    min_allocation_percentage: f64,
    max_allocation_percentage: f64,
    /// Per-follower mutex registry: copy operations for the same follower
    /// are serialized (spec §5), different followers proceed concurrently.
    follower_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl CopyTradingEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        store: Arc<MarketStore>,
        exchange: Arc<dyn ExecutionAdapter>,
        min_copy_amount_usd: f64,
        min_allocation_percentage: f64,
        max_allocation_percentage: f64,
    ) -> Self {
        Self {
            repo,
            store,
            exchange,
            min_copy_amount_usd,
            min_allocation_percentage,
            max_allocation_percentage,
            follower_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, follower_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.follower_locks.lock().await;
        locks.entry(follower_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// `subscribe_to_leader` (spec §4.H): at most one active allocation per
    /// follower; refreshes `allocated_budget` from the current wallet
    /// balance immediately, per the budget-refresh rule in spec §3.
    pub async fn subscribe_to_leader(
        &self,
        follower_id: i64,
        leader_address: &str,
        mode: AllocationMode,
        allocation_percentage: f64,
        fixed_amount_usd: Option<f64>,
    ) -> CoreResult<CopyAllocation> {
        if mode == AllocationMode::Proportional
            && !(self.min_allocation_percentage..=self.max_allocation_percentage).contains(&allocation_percentage)
        {
            return Err(CoreError::ValidationError(format!(
                "allocation_percentage {allocation_percentage} outside [{}, {}]",
                self.min_allocation_percentage, self.max_allocation_percentage
            )));
        }
        if mode == AllocationMode::Fixed && fixed_amount_usd.is_none() {
            return Err(CoreError::ValidationError("fixed_amount_usd required for FIXED mode".into()));
        }

        let lock = self.lock_for(follower_id).await;
        let _guard = lock.lock().await;

        let wallet_balance = self.exchange.get_balance().await?;
        let mut alloc = CopyAllocation {
            follower_id,
            leader_address: leader_address.to_lowercase(),
            allocation_mode: mode,
            allocation_percentage,
            fixed_amount_usd,
            is_active: true,
            total_wallet_balance: wallet_balance,
            allocated_budget: 0.0,
            budget_remaining: 0.0,
            last_wallet_sync: chrono::Utc::now(),
            total_copied_trades: 0,
            total_invested: 0.0,
            total_pnl: 0.0,
        };
        alloc.refresh_budget(wallet_balance);
        alloc.budget_remaining = alloc.allocated_budget;

        self.repo
            .upsert_allocation(&alloc)
            .await
            .map_err(|e| CoreError::Other(e))?;
        Ok(alloc)
    }

    /// Reacts to a wallet-level trade event (spec §2 row I): resolves the
    /// leader, fans it out to every subscribed follower, serialized per
    /// follower.
    pub async fn on_leader_trade(&self, trade: &LeaderTrade) -> CoreResult<()> {
        let _leader = leader::resolve_leader_arc(self.repo.clone(), &trade.wallet_address)
            .await
            .map_err(CoreError::Other)?;

        let followers = self
            .repo
            .list_active_allocations_for_leader(&trade.wallet_address)
            .await
            .map_err(CoreError::Other)?;

        for allocation in followers {
            if let Err(e) = self.copy_for_follower(trade, allocation).await {
                warn!(error = %e, "copy-trade execution failed for follower");
            }
        }
        Ok(())
    }

    async fn copy_for_follower(&self, trade: &LeaderTrade, mut allocation: CopyAllocation) -> CoreResult<()> {
        let lock = self.lock_for(allocation.follower_id).await;
        let _guard = lock.lock().await;

        // Refresh re-read from the repo under the lock, in case a
        // concurrent subscribe/edit raced us to the mutex.
        if let Some(fresh) = self
            .repo
            .get_active_allocation(allocation.follower_id)
            .await
            .map_err(CoreError::Other)?
        {
            allocation = fresh;
        }
        if allocation.wallet_sync_is_stale() {
            let balance = self.exchange.get_balance().await?;
            allocation.refresh_budget(balance);
        }

        let market = self
            .store
            .get_market(&trade.market_id, false)
            .ok_or_else(|| CoreError::NotFound(format!("market {} not in store", trade.market_id)))?;
        if !market.is_tradable() {
            notify::copy_trade_skipped(allocation.follower_id, &trade.wallet_address, "MARKET_NOT_TRADABLE");
            return Ok(());
        }

        let follower_position = self
            .repo
            .get_position(allocation.follower_id, &trade.market_id, trade.outcome_index as usize)
            .await
            .map_err(CoreError::Other)?;

        let decision = size_copy_trade(
            trade,
            &allocation,
            self.min_copy_amount_usd,
            follower_position.as_ref(),
            follower_position.as_ref().map(|p| p.size),
        );

        let token_id = market
            .clob_token_ids
            .get(trade.outcome_index as usize)
            .cloned()
            .ok_or_else(|| CoreError::NotFound("outcome token_id not found".into()))?;
        let price = market
            .outcome_prices
            .get(trade.outcome_index as usize)
            .copied()
            .unwrap_or(0.5);

        match decision {
            SizingDecision::Skip(reason) => {
                notify::copy_trade_skipped(allocation.follower_id, &trade.wallet_address, reason.as_str());
                Ok(())
            }
            SizingDecision::BuyUsd(copy_amount) => {
                let req = OrderRequest {
                    client_order_id: Uuid::new_v4().to_string(),
                    token_id,
                    side: OrderSide::Buy,
                    price,
                    notional_usdc: copy_amount,
                    tif: TimeInForce::Fok,
                    market_slug: Some(market.slug.clone()),
                    outcome: None,
                };
                let ack = self.exchange.place_order(req).await?;
                allocation.budget_remaining -= copy_amount;
                allocation.total_copied_trades += 1;
                allocation.total_invested += copy_amount;
                self.repo.upsert_allocation(&allocation).await.map_err(CoreError::Other)?;
                notify::copy_trade_executed(allocation.follower_id, &trade.wallet_address, copy_amount);
                info!(follower_id = allocation.follower_id, order_id = %ack.order_id, copy_amount, "copy trade BUY executed");
                Ok(())
            }
            SizingDecision::SellTokens(copy_size) => {
                let req = OrderRequest {
                    client_order_id: Uuid::new_v4().to_string(),
                    token_id,
                    side: OrderSide::Sell,
                    price,
                    notional_usdc: copy_size * price,
                    tif: TimeInForce::Ioc,
                    market_slug: Some(market.slug.clone()),
                    outcome: None,
                };
                let ack = self.exchange.place_order(req).await?;
                allocation.total_copied_trades += 1;
                self.repo.upsert_allocation(&allocation).await.map_err(CoreError::Other)?;
                notify::copy_trade_executed(allocation.follower_id, &trade.wallet_address, ack.filled_notional_usdc);
                info!(follower_id = allocation.follower_id, order_id = %ack.order_id, copy_size, "copy trade SELL executed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::paper::PaperExecutionAdapter;
    use crate::models::{Market, MarketStatus, Position, PositionStatus, WatchedAddress};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeRepo {
        allocations: StdMutex<HashMap<i64, CopyAllocation>>,
        watched_addresses: StdMutex<HashMap<String, WatchedAddress>>,
        positions: StdMutex<HashMap<(i64, String, usize), Position>>,
    }

    #[async_trait]
    impl Repository for FakeRepo {
        async fn upsert_watched_market(&self, _wm: &crate::models::WatchedMarket) -> anyhow::Result<()> { Ok(()) }
        async fn list_watched_markets(&self) -> anyhow::Result<Vec<crate::models::WatchedMarket>> { Ok(vec![]) }
        async fn delete_watched_market(&self, _market_id: &str) -> anyhow::Result<()> { Ok(()) }
        async fn list_positions_for_wallet(&self, _wallet_address: &str) -> anyhow::Result<Vec<Position>> { Ok(vec![]) }
        async fn list_positions_with_tpsl(&self, _limit: usize) -> anyhow::Result<Vec<Position>> { Ok(vec![]) }
        async fn upsert_position(&self, p: &Position) -> anyhow::Result<()> {
            self.positions.lock().unwrap().insert((p.user_id, p.market_id.clone(), p.outcome_index), p.clone());
            Ok(())
        }
        async fn all_tracked_wallets(&self) -> anyhow::Result<Vec<String>> { Ok(vec![]) }
        async fn get_active_allocation(&self, follower_id: i64) -> anyhow::Result<Option<CopyAllocation>> {
            Ok(self.allocations.lock().unwrap().get(&follower_id).cloned())
        }
        async fn upsert_allocation(&self, alloc: &CopyAllocation) -> anyhow::Result<()> {
            self.allocations.lock().unwrap().insert(alloc.follower_id, alloc.clone());
            Ok(())
        }
        async fn list_active_allocations_for_leader(&self, leader_address: &str) -> anyhow::Result<Vec<CopyAllocation>> {
            Ok(self
                .allocations
                .lock()
                .unwrap()
                .values()
                .filter(|a| a.leader_address == leader_address.to_lowercase() && a.is_active)
                .cloned()
                .collect())
        }
        async fn get_position(&self, user_id: i64, market_id: &str, outcome_index: usize) -> anyhow::Result<Option<Position>> {
            Ok(self.positions.lock().unwrap().get(&(user_id, market_id.to_string(), outcome_index)).cloned())
        }
        async fn find_watched_address(&self, address: &str) -> anyhow::Result<Option<WatchedAddress>> {
            Ok(self.watched_addresses.lock().unwrap().get(address).cloned())
        }
        async fn insert_watched_address(&self, wa: &WatchedAddress) -> anyhow::Result<WatchedAddress> {
            let wa = WatchedAddress { id: 1, ..wa.clone() };
            self.watched_addresses.lock().unwrap().insert(wa.address.clone(), wa.clone());
            Ok(wa)
        }
        async fn bot_user_id_for_address(&self, _address: &str) -> anyhow::Result<Option<i64>> { Ok(None) }
        async fn get_raw_trade(&self, _tx_id: &str) -> anyhow::Result<Option<LeaderTrade>> { Ok(None) }
        async fn list_raw_trades_since(&self, _since: chrono::DateTime<Utc>) -> anyhow::Result<Vec<LeaderTrade>> { Ok(vec![]) }
        async fn get_smart_wallet_trade(&self, _trade_id: &str) -> anyhow::Result<Option<crate::models::SmartWalletTrade>> { Ok(None) }
        async fn upsert_smart_wallet_trade(&self, _t: &crate::models::SmartWalletTrade) -> anyhow::Result<()> { Ok(()) }
        async fn has_prior_trade_in_condition(&self, _w: &str, _c: &str, _b: chrono::DateTime<Utc>) -> anyhow::Result<bool> { Ok(false) }
        async fn insert_invalid_trade(&self, _tx_id: &str, _reason: &str) -> anyhow::Result<()> { Ok(()) }
        async fn is_already_shared(&self, _trade_id: &str) -> anyhow::Result<bool> { Ok(false) }
        async fn append_to_share_feed(&self, _t: &crate::models::SmartWalletTrade) -> anyhow::Result<()> { Ok(()) }
        async fn get_smart_wallet(&self, _address: &str) -> anyhow::Result<Option<crate::models::SmartWallet>> { Ok(None) }
    }

    fn sample_market() -> Market {
        Market {
            id: "m1".into(),
            condition_id: "0x00".into(),
            question: "Will X happen?".into(),
            slug: "will-x".into(),
            status: MarketStatus::Active,
            outcomes: vec!["NO".into(), "YES".into()],
            outcome_prices: vec![0.5, 0.5],
            clob_token_ids: vec!["t0".into(), "t1".into()],
            volume: 0.0,
            liquidity: 0.0,
            end_date: Some(Utc::now() + chrono::Duration::days(1)),
            event_id: None,
            event_title: None,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn buy_copy_trade_executes_and_updates_budget() {
        let repo = Arc::new(FakeRepo::default());
        let store = Arc::new(MarketStore::new());
        store.upsert_market(sample_market());
        let exchange = Arc::new(PaperExecutionAdapter::new(crate::exchange::paper::PaperExecutionConfig {
            reject_prob: 0.0,
            partial_fill_prob: 0.0,
            base_latency_ms: 0,
            latency_jitter_ms: 0,
            starting_balance_usdc: 10_000.0,
            ..Default::default()
        }));
        let engine = CopyTradingEngine::new(repo.clone(), store, exchange, 1.0, 1.0, 100.0);

        let alloc = engine
            .subscribe_to_leader(1, "0xLeader", AllocationMode::Proportional, 50.0, None)
            .await
            .unwrap();
        assert!(alloc.allocated_budget > 0.0);

        let trade = LeaderTrade {
            tx_id: "t1".into(),
            wallet_address: "0xleader".into(),
            market_id: "m1".into(),
            outcome_index: 1,
            side: Side::Buy,
            size: 400.0,
            price: Some(0.5),
            amount_usd: Some(200.0),
            timestamp: Utc::now(),
            is_smart_wallet: false,
            leader_wallet_balance: Some(2000.0),
        };
        engine.on_leader_trade(&trade).await.unwrap();

        let updated = repo.get_active_allocation(1).await.unwrap().unwrap();
        assert_eq!(updated.total_copied_trades, 1);
        assert!(updated.budget_remaining < updated.allocated_budget);
    }

    #[tokio::test]
    async fn at_most_one_active_allocation_per_follower() {
        let repo = Arc::new(FakeRepo::default());
        let store = Arc::new(MarketStore::new());
        let exchange = Arc::new(PaperExecutionAdapter::default());
        let engine = CopyTradingEngine::new(repo.clone(), store, exchange, 1.0, 1.0, 100.0);

        engine.subscribe_to_leader(1, "0xLeaderA", AllocationMode::Proportional, 10.0, None).await.unwrap();
        engine.subscribe_to_leader(1, "0xLeaderB", AllocationMode::Proportional, 20.0, None).await.unwrap();

        let alloc = repo.get_active_allocation(1).await.unwrap().unwrap();
        assert_eq!(alloc.leader_address, "0xleaderb");
    }
}
