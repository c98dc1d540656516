//! Notification surface (spec §7 "Propagation policy", §4.J). The source
//! system pushes these to Telegram/webhooks; that transport is out of scope
//! here (spec §1 Non-goals), so each notification is a structured `tracing`
//! event at a priority-appropriate level. A downstream log sink or alerting
//! pipeline subscribes to these the same way it would a message queue.

use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
}

/// Everything spec §4.J step g says the TPSL_TRIGGER notification must
/// carry, and §8 scenario 2 names exact values for.
#[derive(Debug, Clone)]
pub struct TpslTriggerPayload<'a> {
    pub user_id: i64,
    pub market_id: &'a str,
    pub market_title: &'a str,
    pub trigger_type: &'a str,
    pub execution_price: f64,
    pub tokens_sold: f64,
    pub usd_received: f64,
    pub entry_price: f64,
    pub realized_pnl: f64,
    pub realized_pnl_pct: f64,
    pub tx_hash: Option<&'a str>,
}

/// A take-profit/stop-loss trigger fired and the sell order was placed.
pub fn tpsl_triggered(p: &TpslTriggerPayload<'_>) {
    warn!(
        priority = ?Priority::High,
        kind = "TPSL_TRIGGER",
        user_id = p.user_id,
        market_id = p.market_id,
        market_title = p.market_title,
        trigger_type = p.trigger_type,
        execution_price = p.execution_price,
        tokens_sold = p.tokens_sold,
        usd_received = p.usd_received,
        entry_price = p.entry_price,
        realized_pnl = p.realized_pnl,
        realized_pnl_pct = p.realized_pnl_pct,
        tx_hash = p.tx_hash.unwrap_or(""),
        "take-profit/stop-loss triggered"
    );
}

/// A triggered TP/SL failed to execute (insufficient funds, market closed,
/// upstream rejection) — always user-visible per spec §7. `hint` is a
/// free-form suggestion such as "try selling manually".
pub fn tpsl_failed(user_id: i64, market_id: &str, reason: &str, hint: &str) {
    error!(
        priority = ?Priority::High,
        kind = "TPSL_FAILED",
        user_id,
        market_id,
        reason,
        hint,
        "take-profit/stop-loss execution failed"
    );
}

/// A copy trade was evaluated but intentionally not placed (budget
/// exhausted, below minimum, leader unresolved, market untradable).
pub fn copy_trade_skipped(follower_id: i64, leader_address: &str, reason: &str) {
    warn!(
        priority = ?Priority::Normal,
        kind = "COPY_TRADE_SKIPPED",
        follower_id,
        leader_address,
        reason,
        "copy trade skipped"
    );
}

/// A copy trade was evaluated, sized, and submitted for execution.
pub fn copy_trade_executed(follower_id: i64, leader_address: &str, copy_amount_usd: f64) {
    warn!(
        priority = ?Priority::Normal,
        kind = "COPY_TRADE_EXECUTED",
        follower_id,
        leader_address,
        copy_amount_usd,
        "copy trade executed"
    );
}
