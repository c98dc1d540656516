//! Single repository interface. Callers (`watched_markets`, `copy_trading`,
//! `smart_wallet`, `tpsl`) hold `Arc<dyn Repository>` and never branch on
//! which implementation backs it — the composition root picks one based on
//! `Config::skip_db`.

use async_trait::async_trait;

use crate::models::{CopyAllocation, LeaderTrade, Position, SmartWallet, SmartWalletTrade, WatchedAddress, WatchedMarket};

#[async_trait]
pub trait Repository: Send + Sync {
    // -- watched_markets --------------------------------------------------
    async fn upsert_watched_market(&self, wm: &WatchedMarket) -> anyhow::Result<()>;
    async fn list_watched_markets(&self) -> anyhow::Result<Vec<WatchedMarket>>;
    async fn delete_watched_market(&self, market_id: &str) -> anyhow::Result<()>;

    // -- user_positions -----------------------------------------------------
    async fn list_positions_for_wallet(&self, wallet_address: &str) -> anyhow::Result<Vec<Position>>;
    async fn list_positions_with_tpsl(&self, limit: usize) -> anyhow::Result<Vec<Position>>;
    async fn upsert_position(&self, p: &Position) -> anyhow::Result<()>;
    async fn all_tracked_wallets(&self) -> anyhow::Result<Vec<String>>;

    // -- copy_allocations -----------------------------------------------------
    async fn get_active_allocation(&self, follower_id: i64) -> anyhow::Result<Option<CopyAllocation>>;
    async fn upsert_allocation(&self, alloc: &CopyAllocation) -> anyhow::Result<()>;
    /// All active allocations that mirror `leader_address`, used by
    /// `copy_trading::engine` to fan a single leader trade out to its
    /// followers.
    async fn list_active_allocations_for_leader(&self, leader_address: &str) -> anyhow::Result<Vec<CopyAllocation>>;
    /// The position a follower currently holds for `(market_id,
    /// outcome_index)`, used to size SELL mirrors (spec §4.H).
    async fn get_position(
        &self,
        user_id: i64,
        market_id: &str,
        outcome_index: usize,
    ) -> anyhow::Result<Option<Position>>;

    // -- copy-leader registry (watched_addresses) -----------------------------
    async fn find_watched_address(&self, address: &str) -> anyhow::Result<Option<WatchedAddress>>;
    async fn insert_watched_address(&self, wa: &WatchedAddress) -> anyhow::Result<WatchedAddress>;
    async fn bot_user_id_for_address(&self, address: &str) -> anyhow::Result<Option<i64>>;

    // -- tracked_leader_trades (raw) ------------------------------------------
    async fn get_raw_trade(&self, tx_id: &str) -> anyhow::Result<Option<LeaderTrade>>;
    async fn list_raw_trades_since(&self, since: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<LeaderTrade>>;

    // -- smart_wallet_trades / _to_share / _invalid ---------------------------
    async fn get_smart_wallet_trade(&self, trade_id: &str) -> anyhow::Result<Option<SmartWalletTrade>>;
    async fn upsert_smart_wallet_trade(&self, t: &SmartWalletTrade) -> anyhow::Result<()>;
    async fn has_prior_trade_in_condition(
        &self,
        wallet_address: &str,
        condition_id: &str,
        before: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<bool>;
    async fn insert_invalid_trade(&self, tx_id: &str, reason: &str) -> anyhow::Result<()>;
    async fn is_already_shared(&self, trade_id: &str) -> anyhow::Result<bool>;
    async fn append_to_share_feed(&self, t: &SmartWalletTrade) -> anyhow::Result<()>;

    // -- smart wallet classification (external-maintained, read-only here) ---
    async fn get_smart_wallet(&self, address: &str) -> anyhow::Result<Option<SmartWallet>>;
}
