//! Canonical data model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub(crate) fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("invalid number")),
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom("invalid float string")),
        _ => Err(serde::de::Error::custom("expected string or number")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Active,
    Closed,
    Resolved,
    Archived,
    Cancelled,
}

impl MarketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MarketStatus::Resolved | MarketStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub condition_id: String,
    pub question: String,
    pub slug: String,
    pub status: MarketStatus,
    pub outcomes: Vec<String>,
    pub outcome_prices: Vec<f64>,
    pub clob_token_ids: Vec<String>,
    pub volume: f64,
    pub liquidity: f64,
    pub end_date: Option<DateTime<Utc>>,
    pub event_id: Option<String>,
    pub event_title: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Market {
    /// Invariant: `len(outcomes) = len(outcome_prices) = len(clob_token_ids)` when non-empty.
    pub fn parallel_arrays_consistent(&self) -> bool {
        if self.outcomes.is_empty() && self.outcome_prices.is_empty() && self.clob_token_ids.is_empty() {
            return true;
        }
        self.outcomes.len() == self.outcome_prices.len()
            && self.outcomes.len() == self.clob_token_ids.len()
    }

    pub fn is_tradable(&self) -> bool {
        self.status == MarketStatus::Active
            && self.end_date.map(|d| d > Utc::now()).unwrap_or(false)
            && !self.outcome_prices.is_empty()
    }

    pub fn outcome_index(&self, outcome_label: &str) -> Option<usize> {
        self.outcomes
            .iter()
            .position(|o| o.eq_ignore_ascii_case(outcome_label))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Ws,
    Poll,
}

/// Volatile per-market live quote (spec §3 `LiveMarketQuote`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiveMarketQuote {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid: Option<f64>,
    pub last_trade_price: Option<f64>,
    pub source: QuoteSource,
    pub updated_at: DateTime<Utc>,
}

impl LiveMarketQuote {
    pub fn new(source: QuoteSource, best_bid: Option<f64>, best_ask: Option<f64>) -> Self {
        let mid = match (best_bid, best_ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        };
        Self {
            best_bid,
            best_ask,
            mid,
            last_trade_price: None,
            source,
            updated_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, max_age: chrono::Duration) -> bool {
        Utc::now() - self.updated_at <= max_age
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedMarket {
    pub market_id: String,
    pub condition_id: String,
    pub active_positions: i64,
    pub last_position_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

/// Dust threshold: positions below this size are treated as non-existent
/// for scheduling purposes (spec §3, §8 boundary behavior).
pub const DUST_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub user_id: i64,
    pub market_id: String,
    pub outcome_index: usize,
    pub outcome_label: String,
    pub token_id: String,
    pub size: f64,
    pub avg_price: f64,
    pub entry_price: f64,
    pub status: PositionStatus,
    pub take_profit_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub current_price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn is_dust(&self) -> bool {
        self.size < DUST_THRESHOLD
    }

    pub fn has_tpsl_trigger(&self) -> bool {
        self.take_profit_price.is_some() || self.stop_loss_price.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Raw on-chain fill as emitted by the indexer (spec §3 `LeaderTrade`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderTrade {
    pub tx_id: String,
    pub wallet_address: String,
    pub market_id: String,
    pub outcome_index: u8,
    pub side: Side,
    pub size: f64,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub amount_usd: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub is_smart_wallet: bool,
    /// Leader's USDC wallet balance at trade time, when the upstream
    /// payload carries it. Used by `copy_trading::sizing`'s PROPORTIONAL
    /// BUY formula (spec §4.H); absent on most raw indexer rows, which is
    /// why the sizing algorithm documents a fallback for this being `None`.
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub leader_wallet_balance: Option<f64>,
}

fn de_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match v {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom("invalid float string")),
        _ => Err(serde::de::Error::custom("expected string or number")),
    }
}

/// Normalized, UI-ready trade row (spec §3 `SmartWalletTrade`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartWalletTrade {
    pub trade_id: String,
    pub wallet_address: String,
    pub market_id: String,
    pub condition_id: String,
    pub position_id: String,
    pub side: Side,
    pub outcome: String,
    pub price: f64,
    pub size: f64,
    pub value: f64,
    pub market_question: String,
    pub is_first_time: bool,
    pub timestamp: DateTime<Utc>,
    /// Explicit DTO field (REDESIGN FLAGS: no dynamic attribute tagging).
    /// True when `price` fell back to the 0.50 default because no real
    /// price was fetchable at enrichment time.
    pub price_is_default: bool,
}

/// Out-of-process-maintained wallet classification (spec §3 `SmartWallet`,
/// added — see DESIGN.md Open Question resolution #4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartWallet {
    pub address: String,
    pub bucket_smart: Option<String>,
    pub win_rate: Option<f64>,
    pub smartscore: Option<f64>,
    pub realized_pnl: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    BotUser,
    SmartTrader,
    CopyLeader,
}

/// Copy-leader registry row (spec §4.H tiered resolution; added to §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedAddress {
    pub id: i64,
    pub address: String,
    pub address_type: AddressType,
    pub linked_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AllocationMode {
    Proportional,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyAllocation {
    pub follower_id: i64,
    pub leader_address: String,
    pub allocation_mode: AllocationMode,
    pub allocation_percentage: f64,
    pub fixed_amount_usd: Option<f64>,
    pub is_active: bool,
    pub total_wallet_balance: f64,
    pub allocated_budget: f64,
    pub budget_remaining: f64,
    pub last_wallet_sync: DateTime<Utc>,
    pub total_copied_trades: i64,
    pub total_invested: f64,
    pub total_pnl: f64,
}

impl CopyAllocation {
    /// Budget refresh rule from spec §3: recompute whenever
    /// `total_wallet_balance` is re-read.
    pub fn refresh_budget(&mut self, total_wallet_balance: f64) {
        self.total_wallet_balance = total_wallet_balance;
        self.allocated_budget = total_wallet_balance * (self.allocation_percentage / 100.0);
        self.last_wallet_sync = Utc::now();
    }

    pub fn wallet_sync_is_stale(&self) -> bool {
        Utc::now() - self.last_wallet_sync > chrono::Duration::hours(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedPositionStatus {
    Pending,
    Processing,
    Redeemed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPosition {
    pub status: ResolvedPositionStatus,
    pub tx_hash: Option<String>,
    pub condition_id: String,
    pub token_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_price_is_average() {
        let q = LiveMarketQuote::new(QuoteSource::Ws, Some(0.42), Some(0.44));
        assert!((q.mid.unwrap() - 0.43).abs() < 1e-9);
    }

    #[test]
    fn dust_threshold() {
        let mut p = sample_position();
        p.size = 0.05;
        assert!(p.is_dust());
        p.size = 0.1;
        assert!(!p.is_dust());
    }

    fn sample_position() -> Position {
        Position {
            id: 1,
            user_id: 1,
            market_id: "m1".into(),
            outcome_index: 1,
            outcome_label: "YES".into(),
            token_id: "t1".into(),
            size: 10.0,
            avg_price: 0.4,
            entry_price: 0.4,
            status: PositionStatus::Active,
            take_profit_price: Some(0.6),
            stop_loss_price: Some(0.3),
            current_price: None,
            updated_at: Utc::now(),
        }
    }
}
