//! Value-object layer for the market/condition/token identifier triad.
//!
//! The upstream exchange mixes a decimal `market_id`, a hex `condition_id`,
//! and ERC-1155 `token_id`s more or less interchangeably. These newtypes
//! keep the conversions explicit and in one place.

use std::fmt;

/// Opaque market identifier as used by the exchange's REST/WS APIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub String);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MarketId {
    fn from(s: String) -> Self {
        MarketId(s)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        MarketId(s.to_string())
    }
}

/// 32-byte on-chain condition id, rendered as `0x` + 64 hex nibbles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ConditionId(pub String);

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ERC-1155 identifier for one outcome share of a market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convert a decimal numeric market id to its 64-nibble hex condition id.
///
/// This is the identity-preserving direction tested by spec.md §8's
/// round-trip law: `decimal_market_id -> condition_id -> decimal_market_id`.
pub fn to_condition_id(decimal_market_id: &str) -> anyhow::Result<ConditionId> {
    let n: num_bigint_compat::BigUint = decimal_market_id
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid decimal market id {decimal_market_id:?}: {e}"))?;
    let hex = format!("{:0>64x}", n);
    Ok(ConditionId(format!("0x{hex}")))
}

/// Convert a 64-nibble hex condition id back to its decimal market id.
pub fn to_decimal_market_id(condition_id: &ConditionId) -> anyhow::Result<String> {
    let stripped = condition_id.0.strip_prefix("0x").unwrap_or(&condition_id.0);
    let n = num_bigint_compat::BigUint::parse_bytes(stripped.as_bytes(), 16)
        .ok_or_else(|| anyhow::anyhow!("invalid hex condition id {condition_id}"))?;
    Ok(n.to_string())
}

/// Thin re-export so `ids.rs` has a single place naming the big-integer
/// backend (this crate already depends on `num-bigint` for ERC-20 balance
/// math; reused here rather than hand-rolling decimal<->hex conversion).
mod num_bigint_compat {
    pub use num_bigint::BigUint;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_id_round_trip() {
        let decimal = "123456789012345678901234567890";
        let cid = to_condition_id(decimal).unwrap();
        assert_eq!(cid.0.len(), 2 + 64);
        assert!(cid.0.starts_with("0x"));
        let back = to_decimal_market_id(&cid).unwrap();
        assert_eq!(back, decimal);
    }

    #[test]
    fn condition_id_zero_pads() {
        let cid = to_condition_id("1").unwrap();
        assert_eq!(cid.0, format!("0x{}1", "0".repeat(63)));
    }
}
