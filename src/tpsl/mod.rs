//! Component K: TP/SL Monitor (spec §4.J). Batched loop over positions with
//! a configured take-profit or stop-loss, price cascade evaluation, a
//! chain-sync + balance-guard step before selling, and post-trade P&L
//! accounting. Per-position serialization and the ≥200ms inter-sell pacing
//! are both explicit spec requirements (§4.J.6, §5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::db::repository::Repository;
use crate::exchange::{ExecutionAdapter, OrderRequest, OrderSide, TimeInForce};
use crate::models::{Position, PositionStatus};
use crate::notify::{self, TpslTriggerPayload};
use crate::positions::PositionsClient;
use crate::store::{live_quote::price_cascade, MarketStore};

/// Maximum positions evaluated per cycle (spec §4.J step 1).
pub const BATCH_LIMIT: usize = 100;
/// Minimum spacing between consecutive sells, process-wide (spec §4.J.6).
pub const INTER_SELL_PACING: Duration = Duration::from_millis(200);
/// Fraction of position size filled at which a trigger closes the position
/// outright rather than partially decrementing it (spec §4.J step f).
pub const CLOSE_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    TakeProfit,
    StopLoss,
}

impl TriggerType {
    fn as_str(&self) -> &'static str {
        match self {
            TriggerType::TakeProfit => "TAKE_PROFIT",
            TriggerType::StopLoss => "STOP_LOSS",
        }
    }
}

/// TP wins over SL when both thresholds are crossed simultaneously (spec
/// §4.J step 4, §8 invariant).
pub fn evaluate_trigger(position: &Position, current_price: f64) -> Option<TriggerType> {
    let tp_fires = position
        .take_profit_price
        .map(|tp| current_price >= tp)
        .unwrap_or(false);
    let sl_fires = position
        .stop_loss_price
        .map(|sl| current_price <= sl)
        .unwrap_or(false);

    if tp_fires {
        Some(TriggerType::TakeProfit)
    } else if sl_fires {
        Some(TriggerType::StopLoss)
    } else {
        None
    }
}

pub struct TpslMonitor {
    repo: Arc<dyn Repository>,
    store: Arc<MarketStore>,
    exchange: Arc<dyn ExecutionAdapter>,
    positions_client: Arc<dyn PositionsClient>,
    interval: Duration,
    position_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    last_sell_at: Mutex<Option<Instant>>,
}

impl TpslMonitor {
    pub fn new(
        repo: Arc<dyn Repository>,
        store: Arc<MarketStore>,
        exchange: Arc<dyn ExecutionAdapter>,
        positions_client: Arc<dyn PositionsClient>,
        cfg: &Config,
    ) -> Self {
        Self {
            repo,
            store,
            exchange,
            positions_client,
            interval: cfg.tpsl_interval(),
            position_locks: Mutex::new(HashMap::new()),
            last_sell_at: Mutex::new(None),
        }
    }

    async fn lock_for(&self, position_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.position_locks.lock().await;
        locks.entry(position_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    #[instrument(name = "tpsl_monitor", skip(self))]
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut ticker = interval(self.interval);
        // "if the TP/SL monitor runs over its 10s cycle, the next cycle is
        // skipped (no pile-up)" — spec §5 Backpressure.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                warn!(error = %e, "tpsl monitor cycle failed");
            }
        }
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        let positions = self.repo.list_positions_with_tpsl(BATCH_LIMIT).await?;
        if positions.is_empty() {
            return Ok(());
        }

        for position in positions {
            let market = match self.store.get_market(&position.market_id, false) {
                Some(m) => m,
                None => continue,
            };
            let current_price = match price_cascade(&self.store, &market, position.outcome_index, None).await {
                Some(p) => p,
                None => continue,
            };
            let Some(trigger_type) = evaluate_trigger(&position, current_price) else {
                continue;
            };

            if let Err(e) = self.fire_trigger(position, &market.question, trigger_type, current_price).await {
                warn!(error = %e, "tpsl trigger execution errored");
            }
        }
        Ok(())
    }

    /// Steps 5a-5g of spec §4.J for a single triggered position. Serialized
    /// per position; interleaves freely across different positions.
    async fn fire_trigger(
        &self,
        mut position: Position,
        market_title: &str,
        trigger_type: TriggerType,
        trigger_price: f64,
    ) -> anyhow::Result<()> {
        let lock = self.lock_for(position.id).await;
        let _guard = lock.lock().await;

        // 5a: sync from chain.
        if let Some(wallet) = self.wallet_for(&position).await {
            if let Ok(chain_positions) = self.positions_client.fetch_positions(&wallet).await {
                if let Some(chain_pos) = chain_positions
                    .iter()
                    .find(|p| p.market_id == position.market_id && p.outcome_index == position.outcome_index)
                {
                    position.size = chain_pos.size;
                }
            }
        }

        // 5b: balance guard.
        if let Ok(token_balance) = self.exchange.get_token_balance(&position.token_id).await {
            if token_balance.is_finite() && token_balance < position.size {
                position.size = token_balance;
            }
        }

        // 5c: already closed.
        if position.size <= 0.0 {
            warn!(position_id = position.id, "tpsl trigger fired on already-closed position, skipping");
            return Ok(());
        }

        self.pace_sell().await;

        // 5d: execute sell.
        let req = OrderRequest {
            client_order_id: uuid::Uuid::new_v4().to_string(),
            token_id: position.token_id.clone(),
            side: OrderSide::Sell,
            price: trigger_price,
            notional_usdc: position.size * trigger_price,
            tif: TimeInForce::Ioc,
            market_slug: None,
            outcome: Some(position.outcome_label.clone()),
        };

        let ack = match self.exchange.place_order(req).await {
            Ok(ack) => ack,
            Err(e) => {
                notify::tpsl_failed(
                    position.user_id,
                    &position.market_id,
                    &e.to_string(),
                    "try selling manually from your positions page",
                );
                return Err(e.into());
            }
        };

        // 5e: post-trade real execution price.
        let tokens_sold = if ack.filled_tokens > 0.0 { ack.filled_tokens } else { position.size };
        let execution_price = if tokens_sold > 0.0 && ack.filled_notional_usdc > 0.0 {
            ack.filled_notional_usdc / tokens_sold
        } else {
            trigger_price
        };
        let realized_pnl = (execution_price - position.entry_price) * tokens_sold;
        let realized_pnl_pct = if position.entry_price > 0.0 {
            (execution_price - position.entry_price) / position.entry_price * 100.0
        } else {
            0.0
        };

        // 5f: close or adjust.
        let fill_ratio = tokens_sold / position.size;
        if fill_ratio >= CLOSE_THRESHOLD {
            position.status = PositionStatus::Closed;
            position.take_profit_price = None;
            position.stop_loss_price = None;
            position.current_price = Some(execution_price);
        } else {
            position.size -= tokens_sold;
            position.current_price = Some(execution_price);
        }
        self.repo.upsert_position(&position).await?;

        // 5g: notify.
        notify::tpsl_triggered(&TpslTriggerPayload {
            user_id: position.user_id,
            market_id: &position.market_id,
            market_title,
            trigger_type: trigger_type.as_str(),
            execution_price,
            tokens_sold,
            usd_received: ack.filled_notional_usdc,
            entry_price: position.entry_price,
            realized_pnl,
            realized_pnl_pct,
            tx_hash: ack.tx_hash.as_deref(),
        });

        info!(
            position_id = position.id,
            trigger_type = trigger_type.as_str(),
            execution_price,
            tokens_sold,
            "tpsl trigger executed"
        );
        Ok(())
    }

    /// Resolves the owner's wallet address for the chain-sync step. This
    /// core has no onboarding/custody table (Non-goal, spec §1); the
    /// position's own `token_id` isn't a wallet, so when this adapter
    /// can't resolve one, step 5a is a no-op and 5b's balance guard alone
    /// still protects against overselling.
    async fn wallet_for(&self, _position: &Position) -> Option<String> {
        None
    }

    /// ≥200ms between consecutive sells, process-wide (spec §4.J.6).
    async fn pace_sell(&self) {
        let mut last = self.last_sell_at.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < INTER_SELL_PACING {
                sleep(INTER_SELL_PACING - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(tp: Option<f64>, sl: Option<f64>) -> Position {
        Position {
            id: 1,
            user_id: 1,
            market_id: "m1".into(),
            outcome_index: 1,
            outcome_label: "YES".into(),
            token_id: "t1".into(),
            size: 100.0,
            avg_price: 0.4,
            entry_price: 0.4,
            status: PositionStatus::Active,
            take_profit_price: tp,
            stop_loss_price: sl,
            current_price: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn take_profit_fires_above_threshold() {
        let p = position(Some(0.6), Some(0.2));
        assert_eq!(evaluate_trigger(&p, 0.65), Some(TriggerType::TakeProfit));
    }

    #[test]
    fn stop_loss_fires_below_threshold() {
        let p = position(Some(0.8), Some(0.3));
        assert_eq!(evaluate_trigger(&p, 0.25), Some(TriggerType::StopLoss));
    }

    #[test]
    fn take_profit_wins_when_both_cross() {
        // A degenerate configuration where tp <= sl: both conditions could
        // hold for the same price; TP must still win (spec §4.J step 4).
        let p = position(Some(0.4), Some(0.6));
        assert_eq!(evaluate_trigger(&p, 0.5), Some(TriggerType::TakeProfit));
    }

    #[test]
    fn no_trigger_when_price_between_thresholds() {
        let p = position(Some(0.8), Some(0.2));
        assert_eq!(evaluate_trigger(&p, 0.5), None);
    }
}
