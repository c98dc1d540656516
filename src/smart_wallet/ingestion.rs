//! Smart-Wallet Trade Ingestion (spec §4.I): validates and enriches raw
//! `tracked_leader_trades` rows into normalized `smart_wallet_trades`, along
//! both the webhook-instant and periodic-polling-backup paths, then runs
//! qualifying rows through the shareable filter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::db::repository::Repository;
use crate::ids;
use crate::models::{LeaderTrade, Side, SmartWalletTrade};
use crate::smart_wallet::shareable::{is_shareable, FilterStats};
use crate::store::MarketStore;

/// Above this invalid/received ratio in a single polling cycle, emit a
/// critical log (spec §4.I "Invalid-rate monitoring").
pub const INVALID_RATE_ALERT_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField(&'static str),
    InvalidSide,
    NonPositiveSize,
}

impl ValidationError {
    fn reason(&self) -> String {
        match self {
            ValidationError::EmptyField(f) => format!("empty field: {f}"),
            ValidationError::InvalidSide => "side not BUY/SELL".to_string(),
            ValidationError::NonPositiveSize => "size <= 0".to_string(),
        }
    }
}

fn validate_raw(raw: &LeaderTrade) -> Result<(), ValidationError> {
    if raw.tx_id.trim().is_empty() {
        return Err(ValidationError::EmptyField("tx_id"));
    }
    if raw.wallet_address.trim().is_empty() {
        return Err(ValidationError::EmptyField("wallet_address"));
    }
    if raw.market_id.trim().is_empty() {
        return Err(ValidationError::EmptyField("market_id"));
    }
    if !matches!(raw.side, Side::Buy | Side::Sell) {
        return Err(ValidationError::InvalidSide);
    }
    if raw.size <= 0.0 {
        return Err(ValidationError::NonPositiveSize);
    }
    Ok(())
}

/// Resolves the real outcome price from the market store, falling back to
/// the trade's own carried price, and finally to 0.50 flagged as defaulted
/// (spec §4.I validation rule for `price`).
fn resolve_price(raw: &LeaderTrade, store: &MarketStore) -> (f64, bool) {
    if let Some(p) = raw.price {
        if p.is_finite() && p > 0.0 {
            return (p, false);
        }
    }
    if let Some(market) = store.get_market(&raw.market_id, true) {
        if let Some(p) = market.outcome_prices.get(raw.outcome_index as usize) {
            if p.is_finite() && *p > 0.0 {
                return (*p, false);
            }
        }
    }
    (0.50, true)
}

/// Enrich a validated raw trade into the normalized view (spec §4.I
/// "Enrichment" a-c).
pub async fn enrich(
    raw: &LeaderTrade,
    repo: &dyn Repository,
    store: &MarketStore,
) -> anyhow::Result<SmartWalletTrade> {
    let condition_id = ids::to_condition_id(&raw.market_id)
        .map(|c| c.0)
        .unwrap_or_else(|_| raw.market_id.clone());

    let (market_question, outcome_label) = match store.get_market(&raw.market_id, true) {
        Some(m) => {
            let label = m
                .outcomes
                .get(raw.outcome_index as usize)
                .cloned()
                .unwrap_or_else(|| "UNKNOWN".to_string());
            (m.question, label)
        }
        None => (String::new(), "UNKNOWN".to_string()),
    };

    let (price, price_is_default) = resolve_price(raw, store);
    let value = price * raw.size;

    let is_first_time = !repo
        .has_prior_trade_in_condition(&raw.wallet_address, &condition_id, raw.timestamp)
        .await?;

    Ok(SmartWalletTrade {
        trade_id: raw.tx_id.clone(),
        wallet_address: raw.wallet_address.to_lowercase(),
        market_id: raw.market_id.clone(),
        condition_id,
        position_id: format!("{}:{}", raw.market_id, raw.outcome_index),
        side: raw.side,
        outcome: outcome_label,
        price,
        size: raw.size,
        value,
        market_question,
        is_first_time,
        timestamp: raw.timestamp,
        price_is_default,
    })
}

/// Validates, enriches, upserts, and (if qualifying) appends a single raw
/// trade to the share feed. Idempotent on `trade_id` per spec §4.I.
pub async fn process_one(
    raw: &LeaderTrade,
    repo: &dyn Repository,
    store: &MarketStore,
    filter_stats: &mut FilterStats,
) -> anyhow::Result<Option<SmartWalletTrade>> {
    if let Err(e) = validate_raw(raw) {
        repo.insert_invalid_trade(&raw.tx_id, &e.reason()).await?;
        warn!(tx_id = %raw.tx_id, reason = %e.reason(), "raw trade failed validation");
        return Ok(None);
    }

    let normalized = enrich(raw, repo, store).await?;
    repo.upsert_smart_wallet_trade(&normalized).await?;

    if !repo.is_already_shared(&normalized.trade_id).await? {
        let leader = repo.get_smart_wallet(&normalized.wallet_address).await?;
        if is_shareable(&normalized, leader.as_ref(), Utc::now(), filter_stats) {
            repo.append_to_share_feed(&normalized).await?;
            debug!(trade_id = %normalized.trade_id, "trade appended to shareable feed");
        }
    }

    Ok(Some(normalized))
}

/// Webhook-instant path (spec §4.I): a single `trade_id` (here, the raw
/// `tx_id`) arrives from an external webhook; look up the raw row and run
/// it through the same pipeline as the polling path.
pub async fn ingest_webhook_trade(
    tx_id: &str,
    repo: &dyn Repository,
    store: &MarketStore,
    filter_stats: &mut FilterStats,
) -> anyhow::Result<Option<SmartWalletTrade>> {
    let Some(raw) = repo.get_raw_trade(tx_id).await? else {
        warn!(tx_id, "webhook-instant ingestion: raw trade not found");
        return Ok(None);
    };
    process_one(&raw, repo, store, filter_stats).await
}

/// Periodic polling-backup cycle (spec §4.I): processes every raw row newer
/// than `since` flagged `is_smart_wallet`, reporting the invalid ratio.
pub async fn run_polling_cycle(
    since: DateTime<Utc>,
    repo: &dyn Repository,
    store: &MarketStore,
    filter_stats: &mut FilterStats,
) -> anyhow::Result<DateTime<Utc>> {
    let raws = repo.list_raw_trades_since(since).await?;
    let smart_wallet_raws: Vec<_> = raws.into_iter().filter(|r| r.is_smart_wallet).collect();

    if smart_wallet_raws.is_empty() {
        return Ok(since);
    }

    let mut max_ts = since;
    let received = smart_wallet_raws.len() as u64;
    let mut invalid = 0u64;

    for raw in &smart_wallet_raws {
        if raw.timestamp > max_ts {
            max_ts = raw.timestamp;
        }
        match process_one(raw, repo, store, filter_stats).await {
            Ok(Some(_)) => {}
            Ok(None) => invalid += 1,
            Err(e) => {
                invalid += 1;
                warn!(tx_id = %raw.tx_id, error = %e, "smart-wallet ingestion error");
            }
        }
    }

    let invalid_ratio = invalid as f64 / received as f64;
    if invalid_ratio > INVALID_RATE_ALERT_THRESHOLD {
        error!(
            invalid,
            received,
            invalid_ratio,
            "smart-wallet-sync invalid-trade ratio exceeded {:.0}% in this cycle",
            INVALID_RATE_ALERT_THRESHOLD * 100.0
        );
    }

    Ok(max_ts)
}

/// Counters exposed to `metrics` by the composition root (SPEC_FULL.md
/// §11's "per-cycle filter statistics" feature).
#[derive(Default)]
pub struct IngestionCounters {
    pub processed: AtomicU64,
    pub invalid: AtomicU64,
}

impl IngestionCounters {
    pub fn record(&self, valid: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if !valid {
            self.invalid.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub type SharedIngestionCounters = Arc<IngestionCounters>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Market, MarketStatus};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRepo {
        raw: Mutex<HashMap<String, LeaderTrade>>,
        normalized: Mutex<HashMap<String, SmartWalletTrade>>,
        invalid: Mutex<Vec<(String, String)>>,
        shared: Mutex<Vec<String>>,
        smart_wallets: Mutex<HashMap<String, crate::models::SmartWallet>>,
        prior_trade: Mutex<bool>,
    }

    #[async_trait]
    impl Repository for FakeRepo {
        async fn upsert_watched_market(&self, _wm: &crate::models::WatchedMarket) -> anyhow::Result<()> { Ok(()) }
        async fn list_watched_markets(&self) -> anyhow::Result<Vec<crate::models::WatchedMarket>> { Ok(vec![]) }
        async fn delete_watched_market(&self, _market_id: &str) -> anyhow::Result<()> { Ok(()) }
        async fn list_positions_for_wallet(&self, _wallet_address: &str) -> anyhow::Result<Vec<crate::models::Position>> { Ok(vec![]) }
        async fn list_positions_with_tpsl(&self, _limit: usize) -> anyhow::Result<Vec<crate::models::Position>> { Ok(vec![]) }
        async fn upsert_position(&self, _p: &crate::models::Position) -> anyhow::Result<()> { Ok(()) }
        async fn all_tracked_wallets(&self) -> anyhow::Result<Vec<String>> { Ok(vec![]) }
        async fn get_active_allocation(&self, _follower_id: i64) -> anyhow::Result<Option<crate::models::CopyAllocation>> { Ok(None) }
        async fn upsert_allocation(&self, _alloc: &crate::models::CopyAllocation) -> anyhow::Result<()> { Ok(()) }
        async fn list_active_allocations_for_leader(&self, _leader_address: &str) -> anyhow::Result<Vec<crate::models::CopyAllocation>> { Ok(vec![]) }
        async fn get_position(&self, _user_id: i64, _market_id: &str, _outcome_index: usize) -> anyhow::Result<Option<crate::models::Position>> { Ok(None) }
        async fn find_watched_address(&self, _address: &str) -> anyhow::Result<Option<crate::models::WatchedAddress>> { Ok(None) }
        async fn insert_watched_address(&self, wa: &crate::models::WatchedAddress) -> anyhow::Result<crate::models::WatchedAddress> { Ok(wa.clone()) }
        async fn bot_user_id_for_address(&self, _address: &str) -> anyhow::Result<Option<i64>> { Ok(None) }
        async fn get_raw_trade(&self, tx_id: &str) -> anyhow::Result<Option<LeaderTrade>> {
            Ok(self.raw.lock().unwrap().get(tx_id).cloned())
        }
        async fn list_raw_trades_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<LeaderTrade>> {
            Ok(self.raw.lock().unwrap().values().filter(|r| r.timestamp > since).cloned().collect())
        }
        async fn get_smart_wallet_trade(&self, trade_id: &str) -> anyhow::Result<Option<SmartWalletTrade>> {
            Ok(self.normalized.lock().unwrap().get(trade_id).cloned())
        }
        async fn upsert_smart_wallet_trade(&self, t: &SmartWalletTrade) -> anyhow::Result<()> {
            self.normalized.lock().unwrap().insert(t.trade_id.clone(), t.clone());
            Ok(())
        }
        async fn has_prior_trade_in_condition(&self, _w: &str, _c: &str, _before: DateTime<Utc>) -> anyhow::Result<bool> {
            Ok(*self.prior_trade.lock().unwrap())
        }
        async fn insert_invalid_trade(&self, tx_id: &str, reason: &str) -> anyhow::Result<()> {
            self.invalid.lock().unwrap().push((tx_id.to_string(), reason.to_string()));
            Ok(())
        }
        async fn is_already_shared(&self, trade_id: &str) -> anyhow::Result<bool> {
            Ok(self.shared.lock().unwrap().iter().any(|t| t == trade_id))
        }
        async fn append_to_share_feed(&self, t: &SmartWalletTrade) -> anyhow::Result<()> {
            self.shared.lock().unwrap().push(t.trade_id.clone());
            Ok(())
        }
        async fn get_smart_wallet(&self, address: &str) -> anyhow::Result<Option<crate::models::SmartWallet>> {
            Ok(self.smart_wallets.lock().unwrap().get(address).cloned())
        }
    }

    fn sample_raw() -> LeaderTrade {
        LeaderTrade {
            tx_id: "tx1".into(),
            wallet_address: "0xABC".into(),
            market_id: "1".into(),
            outcome_index: 1,
            side: Side::Buy,
            size: 1000.0,
            price: Some(0.6),
            amount_usd: Some(600.0),
            timestamp: Utc::now(),
            is_smart_wallet: true,
            leader_wallet_balance: None,
        }
    }

    #[tokio::test]
    async fn invalid_raw_trade_goes_to_dead_letter() {
        let repo = FakeRepo::default();
        let store = MarketStore::new();
        let mut raw = sample_raw();
        raw.tx_id = "".into();
        let mut stats = FilterStats::default();
        let result = process_one(&raw, &repo, &store, &mut stats).await.unwrap();
        assert!(result.is_none());
        assert_eq!(repo.invalid.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn valid_trade_enriches_and_upserts() {
        let repo = FakeRepo::default();
        let store = MarketStore::new();
        store.upsert_market(Market {
            id: "1".into(),
            condition_id: "0x01".into(),
            question: "Will X happen?".into(),
            slug: "will-x".into(),
            status: MarketStatus::Active,
            outcomes: vec!["NO".into(), "YES".into()],
            outcome_prices: vec![0.4, 0.6],
            clob_token_ids: vec!["t0".into(), "t1".into()],
            volume: 0.0,
            liquidity: 0.0,
            end_date: Some(Utc::now() + chrono::Duration::days(1)),
            event_id: None,
            event_title: None,
            last_updated: Utc::now(),
        });

        let raw = sample_raw();
        let mut stats = FilterStats::default();
        let normalized = process_one(&raw, &repo, &store, &mut stats).await.unwrap().unwrap();
        assert_eq!(normalized.outcome, "YES");
        assert_eq!(normalized.market_question, "Will X happen?");
        assert!((normalized.value - 600.0).abs() < 1e-9);
        assert!(!normalized.price_is_default);
    }

    #[tokio::test]
    async fn unresolvable_price_defaults_to_half() {
        let repo = FakeRepo::default();
        let store = MarketStore::new();
        let mut raw = sample_raw();
        raw.price = None;
        let mut stats = FilterStats::default();
        let normalized = process_one(&raw, &repo, &store, &mut stats).await.unwrap().unwrap();
        assert!((normalized.price - 0.50).abs() < 1e-9);
        assert!(normalized.price_is_default);
    }

    #[tokio::test]
    async fn webhook_path_looks_up_raw_row() {
        let repo = FakeRepo::default();
        let store = MarketStore::new();
        repo.raw.lock().unwrap().insert("tx1".into(), sample_raw());
        let mut stats = FilterStats::default();
        let result = ingest_webhook_trade("tx1", &repo, &store, &mut stats).await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn polling_cycle_reports_max_timestamp() {
        let repo = FakeRepo::default();
        let store = MarketStore::new();
        let raw = sample_raw();
        let ts = raw.timestamp;
        repo.raw.lock().unwrap().insert("tx1".into(), raw);
        let mut stats = FilterStats::default();
        let new_since = run_polling_cycle(ts - chrono::Duration::seconds(1), &repo, &store, &mut stats)
            .await
            .unwrap();
        assert_eq!(new_since, ts);
    }
}
