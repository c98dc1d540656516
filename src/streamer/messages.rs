//! Wire frame DTOs for the CLOB market WS channel (spec §4.C, §6). Shape
//! adapted from `scrapers/polymarket_ws.rs::WsBookMsg`.

use serde::Deserialize;

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| serde::de::Error::custom("invalid number")),
        serde_json::Value::String(s) => s.parse().map_err(|_| serde::de::Error::custom("invalid float string")),
        _ => Err(serde::de::Error::custom("expected string or number")),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceLevel {
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub size: f64,
}

/// A `book` (snapshot) or `orderbook` frame — spec §4.C treats them as aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct BookFrame {
    #[serde(rename = "asset_id")]
    pub asset_id: String,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// A `price_change` (delta) frame: only the sides present are updated.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeFrame {
    #[serde(rename = "asset_id")]
    pub asset_id: String,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastTradeFrame {
    #[serde(rename = "asset_id")]
    pub asset_id: String,
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
}

#[derive(Debug, Clone)]
pub enum WsFrame {
    Snapshot(BookFrame),
    Delta(PriceChangeFrame),
    Trade(LastTradeFrame),
    Unrecognized,
}

/// Classify a raw text frame by its `event_type` discriminant and parse the
/// matching variant. Malformed payloads map to `Unrecognized` rather than
/// an error — the streamer logs and moves on (spec §4.C silence on bad frames).
pub fn parse_frame(text: &str) -> WsFrame {
    if text.eq_ignore_ascii_case("PONG") {
        return WsFrame::Unrecognized;
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(text) else {
        return WsFrame::Unrecognized;
    };
    let event_type = json.get("event_type").and_then(|v| v.as_str()).unwrap_or("");
    match event_type {
        "book" | "orderbook" => serde_json::from_value::<BookFrame>(json)
            .map(WsFrame::Snapshot)
            .unwrap_or(WsFrame::Unrecognized),
        "price_change" => serde_json::from_value::<PriceChangeFrame>(json)
            .map(WsFrame::Delta)
            .unwrap_or(WsFrame::Unrecognized),
        "last_trade_price" => serde_json::from_value::<LastTradeFrame>(json)
            .map(WsFrame::Trade)
            .unwrap_or(WsFrame::Unrecognized),
        _ => WsFrame::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_book_snapshot() {
        let text = r#"{"event_type":"book","asset_id":"t1","bids":[{"price":"0.40","size":"100"}],"asks":[{"price":"0.42","size":"50"}]}"#;
        match parse_frame(text) {
            WsFrame::Snapshot(f) => {
                assert_eq!(f.asset_id, "t1");
                assert_eq!(f.bids[0].price, 0.40);
            }
            _ => panic!("expected snapshot"),
        }
    }

    #[test]
    fn unknown_event_type_is_unrecognized() {
        matches!(parse_frame(r#"{"event_type":"ping"}"#), WsFrame::Unrecognized);
    }
}
