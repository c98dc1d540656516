//! Price-read cascade (spec §4.A): "the single precedent used by every
//! consumer... alternative shortcuts are forbidden." Confirmed against
//! `tpsl_monitor.py::_get_current_price()` in `original_source/`.

use async_trait::async_trait;
use chrono::Duration;

use crate::models::{Market, QuoteSource};
use crate::store::market_store::MarketStore;

const WS_FRESHNESS: i64 = 60;

/// Step 4 of the cascade: an external exchange REST call, only attempted
/// when the cached live quote's source is not already `ws` (i.e. WS is not
/// known-authoritative for this market). Implemented by `exchange::*`
/// adapters; kept as a trait here so `store` has no dependency on `exchange`.
#[async_trait]
pub trait RestPriceFallback: Send + Sync {
    async fn fetch_price(&self, token_id: &str) -> anyhow::Result<Option<f64>>;
}

/// Resolve the current price for `(market, outcome_index)` following the
/// exact 4-step cascade from spec §4.A. Binary-market convention: the
/// cached live quote tracks the market's primary (index 1 / YES) token;
/// the complementary outcome's price is `1 - yes_price`.
pub async fn price_cascade(
    store: &MarketStore,
    market: &Market,
    outcome_index: usize,
    rest_fallback: Option<&dyn RestPriceFallback>,
) -> Option<f64> {
    let live = store.get_live_quote(&market.id);

    // Step 1: fresh ws-sourced live quote.
    if let Some(q) = &live {
        if q.source == QuoteSource::Ws && q.is_fresh(Duration::seconds(WS_FRESHNESS)) {
            if let Some(mid) = q.mid {
                return Some(adapt_for_outcome(mid, outcome_index));
            }
        }
    }

    // Step 2: poll-sourced live quote (any freshness).
    if let Some(q) = &live {
        if q.source == QuoteSource::Poll {
            if let Some(mid) = q.mid {
                return Some(adapt_for_outcome(mid, outcome_index));
            }
        }
    }

    // Step 3: canonical outcome_prices from the market record.
    if let Some(p) = market.outcome_prices.get(outcome_index) {
        return Some(*p);
    }

    // Step 4: external REST, only if the cached source isn't already `ws`.
    let source_is_ws = live.as_ref().map(|q| q.source == QuoteSource::Ws).unwrap_or(false);
    if !source_is_ws {
        if let (Some(fallback), Some(token_id)) = (rest_fallback, market.clob_token_ids.get(outcome_index)) {
            if let Ok(Some(price)) = fallback.fetch_price(token_id).await {
                return Some(price);
            }
        }
    }

    None
}

fn adapt_for_outcome(yes_mid: f64, outcome_index: usize) -> f64 {
    if outcome_index == 0 {
        1.0 - yes_mid
    } else {
        yes_mid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LiveMarketQuote, MarketStatus};
    use chrono::Utc;

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
    async fn fresh_ws_quote_wins() {
        let store = MarketStore::new();
        store.set_live_quote("m1", LiveMarketQuote::new(QuoteSource::Ws, Some(0.60), Some(0.62)));
        let market = sample_market();
        let price = price_cascade(&store, &market, 1, None).await.unwrap();
        assert!((price - 0.61).abs() < 1e-9);
    }

    #[tokio::test]
    async fn falls_back_to_canonical_prices_when_no_live_quote() {
        let store = MarketStore::new();
        let market = sample_market();
        let price = price_cascade(&store, &market, 1, None).await.unwrap();
        assert!((price - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_shortcut_past_stale_poll_quote() {
        let store = MarketStore::new();
        store.set_live_quote("m1", LiveMarketQuote::new(QuoteSource::Poll, Some(0.70), Some(0.72)));
        let market = sample_market();
        let price = price_cascade(&store, &market, 1, None).await.unwrap();
        assert!((price - 0.71).abs() < 1e-9);
    }
}
