//! Paper (dry-run) execution: simulates latency, slippage and partial fills
//! so `tpsl`/`copy_trading` exercise the same code path as live trading.
//! Ported near-verbatim from `vault/execution.rs`'s `PaperExecutionAdapter`.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{sleep, Duration};

use crate::error::{CoreError, CoreResult};
use crate::exchange::{ExecutionAdapter, OrderAck, OrderBook, OrderRequest, OrderSide, PriceLevel, TimeInForce};

#[derive(Debug, Clone)]
pub struct PaperExecutionConfig {
    pub base_latency_ms: u64,
    pub latency_jitter_ms: u64,
    pub slippage_bps_per_1k: f64,
    pub base_slippage_bps: f64,
    pub fee_rate: f64,
    pub partial_fill_prob: f64,
    pub min_fill_ratio: f64,
    pub reject_prob: f64,
    pub starting_balance_usdc: f64,
}

impl Default for PaperExecutionConfig {
    fn default() -> Self {
        Self {
            base_latency_ms: 150,
            latency_jitter_ms: 200,
            slippage_bps_per_1k: 15.0,
            base_slippage_bps: 10.0,
            fee_rate: 0.005,
            partial_fill_prob: 0.15,
            min_fill_ratio: 0.4,
            reject_prob: 0.02,
            starting_balance_usdc: 10_000.0,
        }
    }
}

impl PaperExecutionConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("PAPER_BASE_LATENCY_MS") {
            if let Ok(ms) = v.parse() {
                config.base_latency_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("PAPER_STARTING_BALANCE_USDC") {
            if let Ok(b) = v.parse() {
                config.starting_balance_usdc = b;
            }
        }
        config
    }
}

/// Simulated execution venue. Tracks a running balance so `get_balance()`
/// reflects fills, matching the live adapter's balance-guard contract.
pub struct PaperExecutionAdapter {
    config: PaperExecutionConfig,
    balance: tokio::sync::Mutex<f64>,
}

impl Default for PaperExecutionAdapter {
    fn default() -> Self {
        Self::new(PaperExecutionConfig::from_env())
    }
}

impl PaperExecutionAdapter {
    pub fn new(config: PaperExecutionConfig) -> Self {
        let balance = tokio::sync::Mutex::new(config.starting_balance_usdc);
        Self { config, balance }
    }
}

#[async_trait::async_trait]
impl ExecutionAdapter for PaperExecutionAdapter {
    async fn place_order(&self, req: OrderRequest) -> CoreResult<OrderAck> {
        req.validate()?;

        let mut rng = StdRng::from_entropy();

        let jitter: u64 = rng.gen_range(0..=self.config.latency_jitter_ms);
        let total_latency_ms = self.config.base_latency_ms + jitter;
        sleep(Duration::from_millis(total_latency_ms)).await;

        if rng.gen::<f64>() < self.config.reject_prob {
            return Err(CoreError::Transient("paper order rejected (simulated)".into()));
        }

        let size_factor = req.notional_usdc / 1000.0;
        let total_slippage_bps =
            self.config.base_slippage_bps + (self.config.slippage_bps_per_1k * size_factor);
        let slippage_multiplier = total_slippage_bps / 10_000.0;
        let filled_price = match req.side {
            OrderSide::Buy => (req.price * (1.0 + slippage_multiplier)).min(0.99),
            OrderSide::Sell => (req.price * (1.0 - slippage_multiplier)).max(0.01),
        };

        let fill_ratio = if rng.gen::<f64>() < self.config.partial_fill_prob {
            rng.gen_range(self.config.min_fill_ratio..1.0)
        } else {
            1.0
        };

        if req.tif == TimeInForce::Fok && fill_ratio < 1.0 {
            return Err(CoreError::Transient("FOK order could not be fully filled".into()));
        }

        let filled_notional = req.notional_usdc * fill_ratio;
        let fees_usdc = filled_notional * self.config.fee_rate;
        let filled_tokens = filled_notional / filled_price;

        {
            let mut bal = self.balance.lock().await;
            match req.side {
                OrderSide::Buy => *bal -= filled_notional + fees_usdc,
                OrderSide::Sell => *bal += filled_notional - fees_usdc,
            }
            if *bal < 0.0 && req.side == OrderSide::Buy {
                return Err(CoreError::InsufficientFunds {
                    needed: filled_notional + fees_usdc,
                    available: *bal + filled_notional + fees_usdc,
                });
            }
        }

        Ok(OrderAck {
            order_id: format!("paper:{}", req.client_order_id),
            filled_notional_usdc: filled_notional,
            filled_price,
            filled_at: Utc::now(),
            filled_tokens,
            fees_usdc,
            slippage_bps: total_slippage_bps,
            latency_ms: total_latency_ms,
            tx_hash: Some(format!("0xpaper{:0>8x}", rng.gen::<u32>())),
        })
    }

    async fn get_balance(&self) -> CoreResult<f64> {
        Ok(*self.balance.lock().await)
    }

    async fn get_token_balance(&self, _token_id: &str) -> CoreResult<f64> {
        // Paper adapter has no per-token ledger; the balance guard in
        // `tpsl` treats "unknown" as "trust the synced position size".
        Ok(f64::INFINITY)
    }

    async fn get_order_book(&self, _token_id: &str) -> CoreResult<OrderBook> {
        Ok(OrderBook {
            bids: vec![PriceLevel { price: 0.49, size: 1000.0 }],
            asks: vec![PriceLevel { price: 0.51, size: 1000.0 }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buy_debits_balance() {
        let adapter = PaperExecutionAdapter::new(PaperExecutionConfig {
            reject_prob: 0.0,
            partial_fill_prob: 0.0,
            base_latency_ms: 0,
            latency_jitter_ms: 0,
            starting_balance_usdc: 100.0,
            ..PaperExecutionConfig::default()
        });
        let req = OrderRequest {
            client_order_id: "c1".into(),
            token_id: "t1".into(),
            side: OrderSide::Buy,
            price: 0.5,
            notional_usdc: 10.0,
            tif: TimeInForce::Gtc,
            market_slug: None,
            outcome: None,
        };
        let ack = adapter.place_order(req).await.unwrap();
        assert!(ack.filled_notional_usdc > 0.0);
        let bal = adapter.get_balance().await.unwrap();
        assert!(bal < 100.0);
    }

    #[tokio::test]
    async fn rejects_invalid_price() {
        let adapter = PaperExecutionAdapter::default();
        let req = OrderRequest {
            client_order_id: "c1".into(),
            token_id: "t1".into(),
            side: OrderSide::Buy,
            price: 1.5,
            notional_usdc: 10.0,
            tif: TimeInForce::Gtc,
            market_slug: None,
            outcome: None,
        };
        assert!(adapter.place_order(req).await.is_err());
    }
}
