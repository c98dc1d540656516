//! Mirror sizing algorithm (spec §4.H). Pure functions over the domain
//! types so the serialized per-follower execution path (`engine.rs`) stays
//! a thin orchestration layer; grounded on spec.md §4.H plus the Open
//! Question resolution in DESIGN.md for the PROPORTIONAL-BUY fallback
//! when `leader_wallet_balance` is unknown.

use crate::models::{AllocationMode, CopyAllocation, LeaderTrade, Position, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InsufficientBudget,
    BelowMinimum,
    NoPosition,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InsufficientBudget => "INSUFFICIENT_BUDGET",
            SkipReason::BelowMinimum => "BELOW_MINIMUM",
            SkipReason::NoPosition => "NO_POSITION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingDecision {
    /// BUY: size in USD notional to spend.
    BuyUsd(f64),
    /// SELL: size in tokens to sell.
    SellTokens(f64),
    Skip(SkipReason),
}

/// Mirror sizing for an incoming leader trade against a follower's active
/// allocation (spec §4.H). `follower_position_size`/`leader_position_size_before_trade`
/// are only consulted for SELL.
pub fn size_copy_trade(
    trade: &LeaderTrade,
    allocation: &CopyAllocation,
    min_copy_amount_usd: f64,
    follower_position: Option<&Position>,
    leader_position_size_before_trade: Option<f64>,
) -> SizingDecision {
    match trade.side {
        Side::Buy => size_buy(trade, allocation, min_copy_amount_usd),
        Side::Sell => size_sell(trade, follower_position, leader_position_size_before_trade),
    }
}

fn size_buy(trade: &LeaderTrade, allocation: &CopyAllocation, min_copy_amount_usd: f64) -> SizingDecision {
    let leader_amount_usd = trade.amount_usd.unwrap_or(0.0);

    let copy_amount = match allocation.allocation_mode {
        AllocationMode::Proportional => match trade.leader_wallet_balance {
            Some(leader_balance) if leader_balance > 0.0 => {
                leader_amount_usd * (allocation.allocated_budget / leader_balance)
            }
            // Open Question resolution (DESIGN.md #3): when the leader's
            // wallet balance is unknown, fall back to a flat
            // budget-times-percentage slice rather than scaling off the
            // (unknowable) leader notional.
            _ => allocation.allocated_budget * (allocation.allocation_percentage / 100.0),
        },
        AllocationMode::Fixed => allocation.fixed_amount_usd.unwrap_or(0.0).min(allocation.allocated_budget),
    };

    if copy_amount > allocation.budget_remaining {
        return SizingDecision::Skip(SkipReason::InsufficientBudget);
    }
    if copy_amount < min_copy_amount_usd {
        return SizingDecision::Skip(SkipReason::BelowMinimum);
    }
    SizingDecision::BuyUsd(copy_amount)
}

/// SELL is always PROPORTIONAL regardless of the allocation's configured
/// mode (spec §4.H: "sell_mode = PROPORTIONAL (always)").
fn size_sell(
    trade: &LeaderTrade,
    follower_position: Option<&Position>,
    leader_position_size_before_trade: Option<f64>,
) -> SizingDecision {
    let Some(follower_position) = follower_position else {
        return SizingDecision::Skip(SkipReason::NoPosition);
    };
    if follower_position.is_dust() {
        return SizingDecision::Skip(SkipReason::NoPosition);
    }
    let Some(leader_size_before) = leader_position_size_before_trade.filter(|s| *s > 0.0) else {
        return SizingDecision::Skip(SkipReason::NoPosition);
    };

    let ratio = (trade.size / leader_size_before).min(1.0);
    let copy_size = follower_position.size * ratio;
    SizingDecision::SellTokens(copy_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn allocation(mode: AllocationMode) -> CopyAllocation {
        CopyAllocation {
            follower_id: 1,
            leader_address: "0xleader".into(),
            allocation_mode: mode,
            allocation_percentage: 50.0,
            fixed_amount_usd: Some(25.0),
            is_active: true,
            total_wallet_balance: 1000.0,
            allocated_budget: 500.0,
            budget_remaining: 500.0,
            last_wallet_sync: Utc::now(),
            total_copied_trades: 0,
            total_invested: 0.0,
            total_pnl: 0.0,
        }
    }

    fn leader_trade(side: Side, amount_usd: f64, size: f64, leader_wallet_balance: Option<f64>) -> LeaderTrade {
        LeaderTrade {
            tx_id: "t1".into(),
            wallet_address: "0xleader".into(),
            market_id: "m1".into(),
            outcome_index: 1,
            side,
            size,
            price: Some(0.5),
            amount_usd: Some(amount_usd),
            timestamp: Utc::now(),
            is_smart_wallet: false,
            leader_wallet_balance,
        }
    }

    #[test]
    fn proportional_buy_scenario_3() {
        // spec §8 scenario 3: 200 * (500/2000) = $50.
        let trade = leader_trade(Side::Buy, 200.0, 400.0, Some(2000.0));
        let alloc = allocation(AllocationMode::Proportional);
        match size_copy_trade(&trade, &alloc, 1.0, None, None) {
            SizingDecision::BuyUsd(amount) => assert!((amount - 50.0).abs() < 1e-9),
            other => panic!("expected BuyUsd, got {other:?}"),
        }
    }

    #[test]
    fn proportional_buy_falls_back_when_leader_balance_unknown() {
        let trade = leader_trade(Side::Buy, 200.0, 400.0, None);
        let alloc = allocation(AllocationMode::Proportional);
        match size_copy_trade(&trade, &alloc, 1.0, None, None) {
            SizingDecision::BuyUsd(amount) => assert!((amount - 250.0).abs() < 1e-9),
            other => panic!("expected BuyUsd, got {other:?}"),
        }
    }

    #[test]
    fn fixed_buy_capped_at_budget() {
        let trade = leader_trade(Side::Buy, 200.0, 400.0, None);
        let mut alloc = allocation(AllocationMode::Fixed);
        alloc.fixed_amount_usd = Some(9999.0);
        alloc.budget_remaining = 9999.0;
        match size_copy_trade(&trade, &alloc, 1.0, None, None) {
            SizingDecision::BuyUsd(amount) => assert!((amount - alloc.allocated_budget).abs() < 1e-9),
            other => panic!("expected BuyUsd, got {other:?}"),
        }
    }

    #[test]
    fn buy_below_minimum_is_skipped() {
        let trade = leader_trade(Side::Buy, 1.0, 2.0, Some(2000.0));
        let alloc = allocation(AllocationMode::Proportional);
        assert_eq!(
            size_copy_trade(&trade, &alloc, 5.0, None, None),
            SizingDecision::Skip(SkipReason::BelowMinimum)
        );
    }

    #[test]
    fn buy_over_budget_is_skipped() {
        let trade = leader_trade(Side::Buy, 100_000.0, 200_000.0, Some(1.0));
        let alloc = allocation(AllocationMode::Proportional);
        assert_eq!(
            size_copy_trade(&trade, &alloc, 1.0, None, None),
            SizingDecision::Skip(SkipReason::InsufficientBudget)
        );
    }

    #[test]
    fn sell_without_follower_position_is_skipped() {
        let trade = leader_trade(Side::Sell, 100.0, 50.0, None);
        let alloc = allocation(AllocationMode::Fixed);
        assert_eq!(
            size_copy_trade(&trade, &alloc, 1.0, None, Some(100.0)),
            SizingDecision::Skip(SkipReason::NoPosition)
        );
    }

    #[test]
    fn sell_scales_proportionally_to_follower_position() {
        let trade = leader_trade(Side::Sell, 100.0, 50.0, None);
        let alloc = allocation(AllocationMode::Fixed);
        let position = Position {
            id: 1,
            user_id: 1,
            market_id: "m1".into(),
            outcome_index: 1,
            outcome_label: "YES".into(),
            token_id: "t1".into(),
            size: 20.0,
            avg_price: 0.4,
            entry_price: 0.4,
            status: crate::models::PositionStatus::Active,
            take_profit_price: None,
            stop_loss_price: None,
            current_price: None,
            updated_at: Utc::now(),
        };
        match size_copy_trade(&trade, &alloc, 1.0, Some(&position), Some(100.0)) {
            SizingDecision::SellTokens(size) => assert!((size - 10.0).abs() < 1e-9),
            other => panic!("expected SellTokens, got {other:?}"),
        }
    }
}
