//! Execution adapters (spec §6 "Outbound: trade execution"). `ExecutionAdapter`
//! is the single seam `tpsl` and `copy_trading::engine` place orders through;
//! which impl backs it is chosen once at startup from `Config::dry_run`.
//! Near-verbatim adaptation of `vault/execution.rs`.

pub mod paper;
pub mod polymarket_clob;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub token_id: String,
    pub side: OrderSide,
    /// Limit price (0..1) for a Polymarket binary-outcome share.
    pub price: f64,
    /// Notional USDC to spend (BUY) or proceeds target (SELL).
    pub notional_usdc: f64,
    pub tif: TimeInForce,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl OrderRequest {
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.price.is_finite() && self.price > 0.0 && self.price < 1.0) {
            return Err(CoreError::ValidationError(format!(
                "invalid price: {}",
                self.price
            )));
        }
        if !(self.notional_usdc.is_finite() && self.notional_usdc > 0.0) {
            return Err(CoreError::ValidationError(format!(
                "invalid notional: {}",
                self.notional_usdc
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub filled_notional_usdc: f64,
    pub filled_price: f64,
    pub filled_at: chrono::DateTime<chrono::Utc>,
    /// Tokens transacted. BUY: tokens received for `filled_notional_usdc`
    /// spent; SELL: tokens sold for `filled_notional_usdc` received. Needed
    /// by `tpsl`'s post-trade real-execution-price computation (spec §4.J
    /// step e: `usd_received / tokens_sold`).
    #[serde(default)]
    pub filled_tokens: f64,
    #[serde(default)]
    pub fees_usdc: f64,
    #[serde(default)]
    pub slippage_bps: f64,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Single seam for placing orders against any backing exchange. `tpsl` and
/// `copy_trading::engine` hold `Arc<dyn ExecutionAdapter>` and never branch
/// on which concrete adapter is wired in.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn place_order(&self, req: OrderRequest) -> CoreResult<OrderAck>;

    /// Current USDC balance for the account this adapter trades on behalf
    /// of, used by `tpsl`'s pre-sell on-chain balance guard (spec §4.K).
    async fn get_balance(&self) -> CoreResult<f64>;

    /// Raw on-chain token balance for `token_id`, used by `tpsl`'s
    /// balance-guard step (spec §4.J step b): reduce the synced position
    /// size to whichever is smaller.
    async fn get_token_balance(&self, token_id: &str) -> CoreResult<f64>;

    /// Current order book for `token_id` (spec §6 `POST /books`), used as
    /// the REST leg of the §4.A price cascade.
    async fn get_order_book(&self, token_id: &str) -> CoreResult<OrderBook>;
}
