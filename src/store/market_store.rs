//! Canonical `market_id -> Market` map plus the live-quote cell, grounded on
//! `scrapers/polymarket_book_store.rs`'s ArcSwap/RwLock pattern
//! (stripped of its backtest-recording coupling, which has no counterpart
//! in this spec).

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tracing::debug;

use crate::models::{LiveMarketQuote, Market, MarketStatus};

/// Process-wide single-writer canonical market map plus per-market live
/// quote cells. The metadata table (`markets`) and the live-quote table
/// (`market_live`) are independent cells per spec §3 "Ownership" / §5
/// "Shared resources": the Poller mutates the former, the Streamer mutates
/// the latter, and no cross-field consistency is required beyond
/// per-market atomicity.
pub struct MarketStore {
    markets: RwLock<HashMap<String, Market>>,
    live: RwLock<HashMap<String, Arc<ArcSwap<LiveMarketQuote>>>>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self {
            markets: RwLock::new(HashMap::new()),
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert must be idempotent on `id`. A market observed RESOLVED or
    /// CANCELLED transitions the record terminally; subsequent non-terminal
    /// observations are ignored (spec §4.B).
    pub fn upsert_market(&self, record: Market) {
        let mut markets = self.markets.write();
        match markets.get(&record.id) {
            Some(existing) if existing.status.is_terminal() && !record.status.is_terminal() => {
                debug!(market_id = %record.id, "ignoring non-terminal observation of a terminal market");
            }
            _ => {
                markets.insert(record.id.clone(), record);
            }
        }
    }

    pub fn get_market(&self, id: &str, allow_closed: bool) -> Option<Market> {
        let markets = self.markets.read();
        let m = markets.get(id)?;
        if !allow_closed && m.status.is_terminal() {
            return None;
        }
        Some(m.clone())
    }

    pub fn list_active(&self) -> Vec<Market> {
        self.markets
            .read()
            .values()
            .filter(|m| m.status == MarketStatus::Active)
            .cloned()
            .collect()
    }

    pub fn set_live_quote(&self, market_id: &str, quote: LiveMarketQuote) {
        let cell = {
            let live = self.live.read();
            live.get(market_id).cloned()
        };
        match cell {
            Some(cell) => cell.store(Arc::new(quote)),
            None => {
                let mut live = self.live.write();
                live.entry(market_id.to_string())
                    .or_insert_with(|| Arc::new(ArcSwap::from_pointee(quote)));
            }
        }
    }

    pub fn get_live_quote(&self, market_id: &str) -> Option<Arc<LiveMarketQuote>> {
        let live = self.live.read();
        live.get(market_id).map(|cell| cell.load_full())
    }

    pub fn len(&self) -> usize {
        self.markets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuoteSource;
    use chrono::Utc;

    fn sample_market(id: &str, status: MarketStatus) -> Market {
        Market {
            id: id.to_string(),
            condition_id: "0x00".into(),
            question: "Will X happen?".into(),
            slug: "will-x-happen".into(),
            status,
            outcomes: vec!["YES".into(), "NO".into()],
            outcome_prices: vec![0.5, 0.5],
            clob_token_ids: vec!["t1".into(), "t2".into()],
            volume: 0.0,
            liquidity: 0.0,
            end_date: Some(Utc::now() + chrono::Duration::days(1)),
            event_id: None,
            event_title: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = MarketStore::new();
        store.upsert_market(sample_market("m1", MarketStatus::Active));
        store.upsert_market(sample_market("m1", MarketStatus::Active));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn terminal_status_is_sticky() {
        let store = MarketStore::new();
        store.upsert_market(sample_market("m1", MarketStatus::Resolved));
        store.upsert_market(sample_market("m1", MarketStatus::Active));
        let m = store.get_market("m1", true).unwrap();
        assert_eq!(m.status, MarketStatus::Resolved);
    }

    #[test]
    fn live_quote_round_trips() {
        let store = MarketStore::new();
        store.set_live_quote("m1", LiveMarketQuote::new(QuoteSource::Ws, Some(0.42), Some(0.44)));
        let q = store.get_live_quote("m1").unwrap();
        assert!((q.mid.unwrap() - 0.43).abs() < 1e-9);
    }
}
