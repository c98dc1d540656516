//! Shareable filter (spec §4.I): single source of truth for which
//! normalized smart-wallet trades get fanned out to downstream notifiers.
//! The crypto-price exclusion list is carried over from the Python
//! original's filter processor (SPEC_FULL.md §11), since spec.md only
//! describes it as "substring list" without enumerating it.

use chrono::{DateTime, Utc};

use crate::models::{SmartWallet, SmartWalletTrade, Side};

/// Minimum USD notional for a trade to qualify for the shareable feed.
pub const MIN_SHAREABLE_VALUE_USD: f64 = 400.0;
/// Maximum age of a trade for it to still be considered "fresh" enough to share.
pub const MAX_SHAREABLE_AGE: chrono::Duration = chrono::Duration::minutes(5);

/// Case-insensitive substrings that mark a market question as a
/// short-horizon crypto-price-movement market, excluded from the shareable
/// feed regardless of how large the trade is.
pub const CRYPTO_PRICE_PATTERNS: &[&str] = &[
    "up or down",
    "higher or lower",
    "price of bitcoin",
    "price of ethereum",
    "bitcoin above",
    "bitcoin below",
    "ethereum above",
    "ethereum below",
    "next 15 minutes",
    "next hour",
    "hourly price",
];

fn matches_crypto_price_pattern(market_question: &str) -> bool {
    let q = market_question.to_lowercase();
    CRYPTO_PRICE_PATTERNS.iter().any(|p| q.contains(p))
}

/// Per-cycle filter statistics (SPEC_FULL.md §11): exposed as `metrics`
/// gauges by the composition root rather than logged, unlike the Python
/// original's periodic log dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterStats {
    pub processed: u64,
    pub qualified: u64,
    pub rejected_not_buy: u64,
    pub rejected_not_first_time: u64,
    pub rejected_value_too_low: u64,
    pub rejected_empty_question: u64,
    pub rejected_not_very_smart: u64,
    pub rejected_crypto_price_pattern: u64,
    pub rejected_too_old: u64,
}

/// All conditions from spec §4.I's Shareable filter, evaluated in the order
/// a reviewer would check them (cheapest/most-likely-to-reject first).
pub fn is_shareable(
    trade: &SmartWalletTrade,
    leader: Option<&SmartWallet>,
    now: DateTime<Utc>,
    stats: &mut FilterStats,
) -> bool {
    stats.processed += 1;

    if trade.side != Side::Buy {
        stats.rejected_not_buy += 1;
        return false;
    }
    if !trade.is_first_time {
        stats.rejected_not_first_time += 1;
        return false;
    }
    // Default-priced rows fail the value check by construction: they carry
    // no real market value signal, so they cannot be trusted to clear the
    // $400 bar (DESIGN.md Open Question resolution #2).
    if trade.price_is_default || trade.value < MIN_SHAREABLE_VALUE_USD {
        stats.rejected_value_too_low += 1;
        return false;
    }
    if trade.market_question.trim().is_empty() {
        stats.rejected_empty_question += 1;
        return false;
    }
    let is_very_smart = leader
        .and_then(|w| w.bucket_smart.as_deref())
        .map(|b| b == "Very Smart")
        .unwrap_or(false);
    if !is_very_smart {
        stats.rejected_not_very_smart += 1;
        return false;
    }
    if matches_crypto_price_pattern(&trade.market_question) {
        stats.rejected_crypto_price_pattern += 1;
        return false;
    }
    if now - trade.timestamp > MAX_SHAREABLE_AGE {
        stats.rejected_too_old += 1;
        return false;
    }

    stats.qualified += 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_trade() -> SmartWalletTrade {
        SmartWalletTrade {
            trade_id: "t1".into(),
            wallet_address: "0xabc".into(),
            market_id: "1".into(),
            condition_id: "0x01".into(),
            position_id: "p1".into(),
            side: Side::Buy,
            outcome: "YES".into(),
            price: 0.6,
            size: 1000.0,
            value: 600.0,
            market_question: "Will the Lakers win the title?".into(),
            is_first_time: true,
            timestamp: Utc::now(),
            price_is_default: false,
        }
    }

    fn very_smart() -> SmartWallet {
        SmartWallet {
            address: "0xabc".into(),
            bucket_smart: Some("Very Smart".into()),
            win_rate: None,
            smartscore: None,
            realized_pnl: None,
        }
    }

    #[test]
    fn qualifies_when_all_conditions_hold() {
        let mut stats = FilterStats::default();
        assert!(is_shareable(&base_trade(), Some(&very_smart()), Utc::now(), &mut stats));
        assert_eq!(stats.qualified, 1);
    }

    #[test]
    fn rejects_sell_side() {
        let mut trade = base_trade();
        trade.side = Side::Sell;
        let mut stats = FilterStats::default();
        assert!(!is_shareable(&trade, Some(&very_smart()), Utc::now(), &mut stats));
        assert_eq!(stats.rejected_not_buy, 1);
    }

    #[test]
    fn rejects_default_priced_value() {
        let mut trade = base_trade();
        trade.price_is_default = true;
        trade.value = 10_000.0;
        let mut stats = FilterStats::default();
        assert!(!is_shareable(&trade, Some(&very_smart()), Utc::now(), &mut stats));
        assert_eq!(stats.rejected_value_too_low, 1);
    }

    #[test]
    fn rejects_below_smart_tier() {
        let not_very_smart = SmartWallet { bucket_smart: Some("Smart".into()), ..very_smart() };
        let mut stats = FilterStats::default();
        assert!(!is_shareable(&base_trade(), Some(&not_very_smart), Utc::now(), &mut stats));
        assert_eq!(stats.rejected_not_very_smart, 1);
    }

    #[test]
    fn rejects_crypto_price_markets() {
        let mut trade = base_trade();
        trade.market_question = "Will Bitcoin be Up or Down at 3pm?".into();
        let mut stats = FilterStats::default();
        assert!(!is_shareable(&trade, Some(&very_smart()), Utc::now(), &mut stats));
        assert_eq!(stats.rejected_crypto_price_pattern, 1);
    }

    #[test]
    fn rejects_stale_trades() {
        let mut trade = base_trade();
        trade.timestamp = Utc::now() - chrono::Duration::minutes(10);
        let mut stats = FilterStats::default();
        assert!(!is_shareable(&trade, Some(&very_smart()), Utc::now(), &mut stats));
        assert_eq!(stats.rejected_too_old, 1);
    }

    #[test]
    fn rejects_unknown_classification() {
        let mut stats = FilterStats::default();
        assert!(!is_shareable(&base_trade(), None, Utc::now(), &mut stats));
        assert_eq!(stats.rejected_not_very_smart, 1);
    }
}
