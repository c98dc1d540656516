//! Exchange-side positions client plus the per-wallet TTL cache spec §4.F
//! and §5 describe (`GET /positions?user=<address>&limit=100`, spec §6;
//! cache TTL 180s, "single TTL store; invalidation is idempotent", spec
//! §5 "Shared resources"). Grounded on `poller/gamma_client.rs`'s DTO
//! style for the REST leg.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::ids::to_decimal_market_id;
use crate::models::{Position, PositionStatus};
use crate::store::MarketStore;

/// Seam between `watched_markets`/`tpsl` and the exchange's live positions
/// feed, so both can be exercised with a fake in tests without a network.
#[async_trait]
pub trait PositionsClient: Send + Sync {
    async fn fetch_positions(&self, wallet_address: &str) -> CoreResult<Vec<Position>>;
}

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        _ => Ok(0.0),
    }
}

/// Raw shape of a row from spec §6 `GET /positions`.
#[derive(Debug, Clone, Deserialize)]
struct RawPositionDto {
    #[serde(rename = "conditionId")]
    condition_id: String,
    asset: String,
    #[serde(deserialize_with = "de_f64")]
    size: f64,
    #[serde(rename = "avgPrice", deserialize_with = "de_f64")]
    avg_price: f64,
    outcome: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "curPrice", default, deserialize_with = "de_f64")]
    cur_price: f64,
}

impl RawPositionDto {
    /// `user_id` is carried by the caller, not this row (the exchange only
    /// knows the wallet address); `outcome_index` is resolved against the
    /// market store when available, defaulting to the binary-market "YES"
    /// convention (index 1) when the market isn't cached locally yet.
    fn into_position(self, user_id: i64, store: Option<&MarketStore>) -> anyhow::Result<Position> {
        let market_id = to_decimal_market_id_or_self(&self.condition_id);
        let outcome_index = store
            .and_then(|s| s.get_market(&market_id, true))
            .and_then(|m| m.outcome_index(&self.outcome))
            .unwrap_or(if self.outcome.eq_ignore_ascii_case("NO") { 0 } else { 1 });

        Ok(Position {
            id: 0,
            user_id,
            market_id,
            outcome_index,
            outcome_label: self.outcome,
            token_id: self.asset,
            size: self.size,
            avg_price: self.avg_price,
            entry_price: self.avg_price,
            status: if self.size < crate::models::DUST_THRESHOLD {
                PositionStatus::Closed
            } else {
                PositionStatus::Active
            },
            take_profit_price: None,
            stop_loss_price: None,
            current_price: if self.cur_price > 0.0 { Some(self.cur_price) } else { None },
            updated_at: chrono::Utc::now(),
        })
    }
}

/// `condition_id` is already the exchange's native identifier for most
/// positions payloads in practice; fall back to the hex->decimal
/// conversion only when it parses as a `0x`-prefixed hex string.
fn to_decimal_market_id_or_self(condition_id: &str) -> String {
    if condition_id.starts_with("0x") {
        to_decimal_market_id(&crate::ids::ConditionId(condition_id.to_string()))
            .unwrap_or_else(|_| condition_id.to_string())
    } else {
        condition_id.to_string()
    }
}

pub struct ExchangePositionsClient {
    http: reqwest::Client,
    base_url: String,
    store: Option<Arc<MarketStore>>,
}

impl ExchangePositionsClient {
    pub fn new(base_url: String, store: Option<Arc<MarketStore>>) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Fatal(format!("build positions http client: {e}")))?;
        Ok(Self { http, base_url, store })
    }
}

#[async_trait]
impl PositionsClient for ExchangePositionsClient {
    async fn fetch_positions(&self, wallet_address: &str) -> CoreResult<Vec<Position>> {
        let url = format!("{}/positions", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[("user", wallet_address), ("limit", "100")])
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("GET /positions: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::UpstreamThrottled("positions API rate limited".into()));
        }
        if !resp.status().is_success() {
            return Err(CoreError::UpstreamUnavailable(format!(
                "positions API status {}",
                resp.status()
            )));
        }
        let raw: Vec<RawPositionDto> = resp
            .json()
            .await
            .map_err(|e| CoreError::ParseError(format!("parse positions response: {e}")))?;

        let mut out = Vec::with_capacity(raw.len());
        for dto in raw {
            match dto.into_position(0, self.store.as_deref()) {
                Ok(p) => out.push(p),
                Err(e) => warn!(wallet_address, error = %e, "skipping unparsable position"),
            }
        }
        Ok(out)
    }
}

/// Single per-wallet TTL store (spec §5 "Position cache (per wallet)").
/// Shared by the Watched-Markets Controller and any other caller that
/// needs a recent positions snapshot without hammering the exchange API.
pub struct PositionCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Arc<Vec<Position>>)>>,
}

impl PositionCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached snapshot if fresh, else `None` (caller fetches
    /// and calls `store`).
    pub fn get(&self, wallet_address: &str) -> Option<Arc<Vec<Position>>> {
        let entries = self.entries.lock();
        let (fetched_at, positions) = entries.get(wallet_address)?;
        if fetched_at.elapsed() <= self.ttl {
            Some(positions.clone())
        } else {
            None
        }
    }

    pub fn store(&self, wallet_address: &str, positions: Vec<Position>) {
        self.entries
            .lock()
            .insert(wallet_address.to_string(), (Instant::now(), Arc::new(positions)));
    }

    /// Idempotent: invalidating an address with no entry is a no-op.
    pub fn invalidate(&self, wallet_address: &str) {
        self.entries.lock().remove(wallet_address);
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_expires_after_ttl() {
        let cache = PositionCache::new(Duration::from_millis(10));
        cache.store("0xabc", vec![]);
        assert!(cache.get("0xabc").is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("0xabc").is_none());
    }

    #[test]
    fn invalidate_is_idempotent() {
        let cache = PositionCache::new(Duration::from_secs(60));
        cache.invalidate("0xnothere");
        cache.invalidate("0xnothere");
    }

    #[test]
    fn condition_id_passthrough_for_non_hex() {
        assert_eq!(to_decimal_market_id_or_self("123456"), "123456");
    }
}
