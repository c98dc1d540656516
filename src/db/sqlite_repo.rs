//! Direct-DB `Repository` implementation, following the
//! `vault/user_accounts.rs` rusqlite style (`Arc<Mutex<Connection>>`,
//! `CREATE TABLE IF NOT EXISTS`, RFC3339 timestamp columns).

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::db::repository::Repository;
use crate::models::*;

pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open sqlite db")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS watched_markets (
                market_id TEXT PRIMARY KEY,
                condition_id TEXT NOT NULL,
                active_positions INTEGER NOT NULL DEFAULT 0,
                last_position_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                wallet_address TEXT NOT NULL,
                market_id TEXT NOT NULL,
                outcome_index INTEGER NOT NULL,
                outcome_label TEXT NOT NULL,
                token_id TEXT NOT NULL,
                size REAL NOT NULL,
                avg_price REAL NOT NULL,
                entry_price REAL NOT NULL,
                status TEXT NOT NULL,
                take_profit_price REAL,
                stop_loss_price REAL,
                current_price REAL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, market_id, outcome_index)
            );
            CREATE INDEX IF NOT EXISTS idx_positions_wallet ON user_positions(wallet_address);
            CREATE INDEX IF NOT EXISTS idx_positions_tpsl ON user_positions(status, take_profit_price, stop_loss_price);

            CREATE TABLE IF NOT EXISTS copy_allocations (
                follower_id INTEGER PRIMARY KEY,
                leader_address TEXT NOT NULL,
                allocation_mode TEXT NOT NULL,
                allocation_percentage REAL NOT NULL,
                fixed_amount_usd REAL,
                is_active INTEGER NOT NULL DEFAULT 1,
                total_wallet_balance REAL NOT NULL DEFAULT 0,
                allocated_budget REAL NOT NULL DEFAULT 0,
                budget_remaining REAL NOT NULL DEFAULT 0,
                last_wallet_sync TEXT NOT NULL,
                total_copied_trades INTEGER NOT NULL DEFAULT 0,
                total_invested REAL NOT NULL DEFAULT 0,
                total_pnl REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS watched_addresses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT UNIQUE NOT NULL,
                address_type TEXT NOT NULL,
                linked_user_id INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tracked_leader_trades (
                tx_id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                market_id TEXT NOT NULL,
                outcome_index INTEGER NOT NULL,
                side TEXT NOT NULL,
                size REAL NOT NULL,
                price REAL,
                amount_usd REAL,
                timestamp TEXT NOT NULL,
                is_smart_wallet INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_tracked_trades_time ON tracked_leader_trades(timestamp);

            CREATE TABLE IF NOT EXISTS smart_wallet_trades (
                trade_id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                market_id TEXT NOT NULL,
                condition_id TEXT NOT NULL,
                position_id TEXT NOT NULL,
                side TEXT NOT NULL,
                outcome TEXT NOT NULL,
                price REAL NOT NULL,
                size REAL NOT NULL,
                value REAL NOT NULL,
                market_question TEXT NOT NULL,
                is_first_time INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                price_is_default INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_smart_trades_condition ON smart_wallet_trades(wallet_address, condition_id, timestamp);

            CREATE TABLE IF NOT EXISTS smart_wallet_trades_to_share (
                trade_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS smart_wallet_trades_invalid (
                tx_id TEXT PRIMARY KEY,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS smart_wallets (
                address TEXT PRIMARY KEY,
                bucket_smart TEXT,
                win_rate REAL,
                smartscore REAL,
                realized_pnl REAL
            );
            ",
        )?;
        Ok(())
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn side_to_str(s: Side) -> &'static str {
    match s {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn side_from_str(s: &str) -> Side {
    if s.eq_ignore_ascii_case("BUY") {
        Side::Buy
    } else {
        Side::Sell
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn upsert_watched_market(&self, wm: &WatchedMarket) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO watched_markets (market_id, condition_id, active_positions, last_position_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(market_id) DO UPDATE SET
                active_positions = excluded.active_positions,
                last_position_at = excluded.last_position_at",
            params![
                wm.market_id,
                wm.condition_id,
                wm.active_positions,
                wm.last_position_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    async fn list_watched_markets(&self) -> Result<Vec<WatchedMarket>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT market_id, condition_id, active_positions, last_position_at FROM watched_markets")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(WatchedMarket {
                    market_id: row.get(0)?,
                    condition_id: row.get(1)?,
                    active_positions: row.get(2)?,
                    last_position_at: parse_ts(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn delete_watched_market(&self, market_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM watched_markets WHERE market_id = ?1", params![market_id])?;
        Ok(())
    }

    async fn list_positions_for_wallet(&self, wallet_address: &str) -> Result<Vec<Position>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, market_id, outcome_index, outcome_label, token_id, size, avg_price,
                    entry_price, status, take_profit_price, stop_loss_price, current_price, updated_at
             FROM user_positions WHERE wallet_address = ?1",
        )?;
        let rows = stmt
            .query_map(params![wallet_address], row_to_position)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn list_positions_with_tpsl(&self, limit: usize) -> Result<Vec<Position>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, market_id, outcome_index, outcome_label, token_id, size, avg_price,
                    entry_price, status, take_profit_price, stop_loss_price, current_price, updated_at
             FROM user_positions
             WHERE status = 'active' AND (take_profit_price IS NOT NULL OR stop_loss_price IS NOT NULL)
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_position)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn upsert_position(&self, p: &Position) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_positions (id, user_id, wallet_address, market_id, outcome_index, outcome_label,
                token_id, size, avg_price, entry_price, status, take_profit_price, stop_loss_price,
                current_price, updated_at)
             VALUES (?1, ?2, '', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(user_id, market_id, outcome_index) DO UPDATE SET
                size = excluded.size,
                avg_price = excluded.avg_price,
                status = excluded.status,
                take_profit_price = excluded.take_profit_price,
                stop_loss_price = excluded.stop_loss_price,
                current_price = excluded.current_price,
                updated_at = excluded.updated_at",
            params![
                p.id,
                p.user_id,
                p.market_id,
                p.outcome_index as i64,
                p.outcome_label,
                p.token_id,
                p.size,
                p.avg_price,
                p.entry_price,
                match p.status {
                    PositionStatus::Active => "active",
                    PositionStatus::Closed => "closed",
                },
                p.take_profit_price,
                p.stop_loss_price,
                p.current_price,
                p.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn all_tracked_wallets(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT DISTINCT wallet_address FROM user_positions")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get_active_allocation(&self, follower_id: i64) -> Result<Option<CopyAllocation>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT follower_id, leader_address, allocation_mode, allocation_percentage, fixed_amount_usd,
                    is_active, total_wallet_balance, allocated_budget, budget_remaining, last_wallet_sync,
                    total_copied_trades, total_invested, total_pnl
             FROM copy_allocations WHERE follower_id = ?1 AND is_active = 1",
            params![follower_id],
            row_to_allocation,
        )
        .optional()
        .context("query active allocation")
    }

    async fn upsert_allocation(&self, alloc: &CopyAllocation) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO copy_allocations (follower_id, leader_address, allocation_mode, allocation_percentage,
                fixed_amount_usd, is_active, total_wallet_balance, allocated_budget, budget_remaining,
                last_wallet_sync, total_copied_trades, total_invested, total_pnl)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(follower_id) DO UPDATE SET
                leader_address = excluded.leader_address,
                allocation_mode = excluded.allocation_mode,
                allocation_percentage = excluded.allocation_percentage,
                fixed_amount_usd = excluded.fixed_amount_usd,
                is_active = excluded.is_active,
                total_wallet_balance = excluded.total_wallet_balance,
                allocated_budget = excluded.allocated_budget,
                budget_remaining = excluded.budget_remaining,
                last_wallet_sync = excluded.last_wallet_sync,
                total_copied_trades = excluded.total_copied_trades,
                total_invested = excluded.total_invested,
                total_pnl = excluded.total_pnl",
            params![
                alloc.follower_id,
                alloc.leader_address.to_lowercase(),
                match alloc.allocation_mode {
                    AllocationMode::Proportional => "PROPORTIONAL",
                    AllocationMode::Fixed => "FIXED",
                },
                alloc.allocation_percentage,
                alloc.fixed_amount_usd,
                alloc.is_active as i64,
                alloc.total_wallet_balance,
                alloc.allocated_budget,
                alloc.budget_remaining,
                alloc.last_wallet_sync.to_rfc3339(),
                alloc.total_copied_trades,
                alloc.total_invested,
                alloc.total_pnl,
            ],
        )?;
        Ok(())
    }

    async fn list_active_allocations_for_leader(&self, leader_address: &str) -> Result<Vec<CopyAllocation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT follower_id, leader_address, allocation_mode, allocation_percentage, fixed_amount_usd,
                    is_active, total_wallet_balance, allocated_budget, budget_remaining, last_wallet_sync,
                    total_copied_trades, total_invested, total_pnl
             FROM copy_allocations WHERE leader_address = ?1 AND is_active = 1",
        )?;
        let rows = stmt
            .query_map(params![leader_address.to_lowercase()], row_to_allocation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get_position(&self, user_id: i64, market_id: &str, outcome_index: usize) -> Result<Option<Position>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, user_id, market_id, outcome_index, outcome_label, token_id, size, avg_price,
                    entry_price, status, take_profit_price, stop_loss_price, current_price, updated_at
             FROM user_positions WHERE user_id = ?1 AND market_id = ?2 AND outcome_index = ?3",
            params![user_id, market_id, outcome_index as i64],
            row_to_position,
        )
        .optional()
        .context("get position")
    }

    async fn find_watched_address(&self, address: &str) -> Result<Option<WatchedAddress>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, address, address_type, linked_user_id, created_at FROM watched_addresses WHERE address = ?1",
            params![address.to_lowercase()],
            row_to_watched_address,
        )
        .optional()
        .context("find watched address")
    }

    async fn insert_watched_address(&self, wa: &WatchedAddress) -> Result<WatchedAddress> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO watched_addresses (address, address_type, linked_user_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                wa.address.to_lowercase(),
                match wa.address_type {
                    AddressType::BotUser => "bot_user",
                    AddressType::SmartTrader => "smart_trader",
                    AddressType::CopyLeader => "copy_leader",
                },
                wa.linked_user_id,
                wa.created_at.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(WatchedAddress { id, ..wa.clone() })
    }

    async fn bot_user_id_for_address(&self, _address: &str) -> Result<Option<i64>> {
        // User-account lookup is owned by an out-of-scope onboarding system
        // (spec §1 Non-goals); this crate has no bot-user table of its own.
        Ok(None)
    }

    async fn get_raw_trade(&self, tx_id: &str) -> Result<Option<LeaderTrade>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT tx_id, wallet_address, market_id, outcome_index, side, size, price, amount_usd, timestamp, is_smart_wallet
             FROM tracked_leader_trades WHERE tx_id = ?1",
            params![tx_id],
            row_to_leader_trade,
        )
        .optional()
        .context("get raw trade")
    }

    async fn list_raw_trades_since(&self, since: DateTime<Utc>) -> Result<Vec<LeaderTrade>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT tx_id, wallet_address, market_id, outcome_index, side, size, price, amount_usd, timestamp, is_smart_wallet
             FROM tracked_leader_trades WHERE timestamp > ?1 AND is_smart_wallet = 1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![since.to_rfc3339()], row_to_leader_trade)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get_smart_wallet_trade(&self, trade_id: &str) -> Result<Option<SmartWalletTrade>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT trade_id, wallet_address, market_id, condition_id, position_id, side, outcome, price, size,
                    value, market_question, is_first_time, timestamp, price_is_default
             FROM smart_wallet_trades WHERE trade_id = ?1",
            params![trade_id],
            row_to_smart_wallet_trade,
        )
        .optional()
        .context("get smart wallet trade")
    }

    async fn upsert_smart_wallet_trade(&self, t: &SmartWalletTrade) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO smart_wallet_trades (trade_id, wallet_address, market_id, condition_id, position_id,
                side, outcome, price, size, value, market_question, is_first_time, timestamp, price_is_default)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(trade_id) DO UPDATE SET
                is_first_time = excluded.is_first_time OR smart_wallet_trades.is_first_time",
            params![
                t.trade_id,
                t.wallet_address,
                t.market_id,
                t.condition_id,
                t.position_id,
                side_to_str(t.side),
                t.outcome,
                t.price,
                t.size,
                t.value,
                t.market_question,
                t.is_first_time as i64,
                t.timestamp.to_rfc3339(),
                t.price_is_default as i64,
            ],
        )?;
        Ok(())
    }

    async fn has_prior_trade_in_condition(
        &self,
        wallet_address: &str,
        condition_id: &str,
        before: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM smart_wallet_trades WHERE wallet_address = ?1 AND condition_id = ?2 AND timestamp < ?3",
            params![wallet_address, condition_id, before.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn insert_invalid_trade(&self, tx_id: &str, reason: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO smart_wallet_trades_invalid (tx_id, reason, created_at) VALUES (?1, ?2, ?3)",
            params![tx_id, reason, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn is_already_shared(&self, trade_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM smart_wallet_trades_to_share WHERE trade_id = ?1",
            params![trade_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn append_to_share_feed(&self, t: &SmartWalletTrade) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO smart_wallet_trades_to_share (trade_id, created_at) VALUES (?1, ?2)",
            params![t.trade_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn get_smart_wallet(&self, address: &str) -> Result<Option<SmartWallet>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT address, bucket_smart, win_rate, smartscore, realized_pnl FROM smart_wallets WHERE address = ?1",
            params![address.to_lowercase()],
            |row| {
                Ok(SmartWallet {
                    address: row.get(0)?,
                    bucket_smart: row.get(1)?,
                    win_rate: row.get(2)?,
                    smartscore: row.get(3)?,
                    realized_pnl: row.get(4)?,
                })
            },
        )
        .optional()
        .context("get smart wallet")
    }
}

fn row_to_position(row: &rusqlite::Row) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get(0)?,
        user_id: row.get(1)?,
        market_id: row.get(2)?,
        outcome_index: row.get::<_, i64>(3)? as usize,
        outcome_label: row.get(4)?,
        token_id: row.get(5)?,
        size: row.get(6)?,
        avg_price: row.get(7)?,
        entry_price: row.get(8)?,
        status: if row.get::<_, String>(9)? == "active" {
            PositionStatus::Active
        } else {
            PositionStatus::Closed
        },
        take_profit_price: row.get(10)?,
        stop_loss_price: row.get(11)?,
        current_price: row.get(12)?,
        updated_at: parse_ts(&row.get::<_, String>(13)?),
    })
}

fn row_to_allocation(row: &rusqlite::Row) -> rusqlite::Result<CopyAllocation> {
    Ok(CopyAllocation {
        follower_id: row.get(0)?,
        leader_address: row.get(1)?,
        allocation_mode: if row.get::<_, String>(2)? == "FIXED" {
            AllocationMode::Fixed
        } else {
            AllocationMode::Proportional
        },
        allocation_percentage: row.get(3)?,
        fixed_amount_usd: row.get(4)?,
        is_active: row.get::<_, i64>(5)? == 1,
        total_wallet_balance: row.get(6)?,
        allocated_budget: row.get(7)?,
        budget_remaining: row.get(8)?,
        last_wallet_sync: parse_ts(&row.get::<_, String>(9)?),
        total_copied_trades: row.get(10)?,
        total_invested: row.get(11)?,
        total_pnl: row.get(12)?,
    })
}

fn row_to_watched_address(row: &rusqlite::Row) -> rusqlite::Result<WatchedAddress> {
    let t: String = row.get(2)?;
    Ok(WatchedAddress {
        id: row.get(0)?,
        address: row.get(1)?,
        address_type: match t.as_str() {
            "bot_user" => AddressType::BotUser,
            "smart_trader" => AddressType::SmartTrader,
            _ => AddressType::CopyLeader,
        },
        linked_user_id: row.get(3)?,
        created_at: parse_ts(&row.get::<_, String>(4)?),
    })
}

fn row_to_leader_trade(row: &rusqlite::Row) -> rusqlite::Result<LeaderTrade> {
    Ok(LeaderTrade {
        tx_id: row.get(0)?,
        wallet_address: row.get(1)?,
        market_id: row.get(2)?,
        outcome_index: row.get::<_, i64>(3)? as u8,
        side: side_from_str(&row.get::<_, String>(4)?),
        size: row.get(5)?,
        price: row.get(6)?,
        amount_usd: row.get(7)?,
        timestamp: parse_ts(&row.get::<_, String>(8)?),
        is_smart_wallet: row.get::<_, i64>(9)? == 1,
        leader_wallet_balance: None,
    })
}

fn row_to_smart_wallet_trade(row: &rusqlite::Row) -> rusqlite::Result<SmartWalletTrade> {
    Ok(SmartWalletTrade {
        trade_id: row.get(0)?,
        wallet_address: row.get(1)?,
        market_id: row.get(2)?,
        condition_id: row.get(3)?,
        position_id: row.get(4)?,
        side: side_from_str(&row.get::<_, String>(5)?),
        outcome: row.get(6)?,
        price: row.get(7)?,
        size: row.get(8)?,
        value: row.get(9)?,
        market_question: row.get(10)?,
        is_first_time: row.get::<_, i64>(11)? == 1,
        timestamp: parse_ts(&row.get::<_, String>(12)?),
        price_is_default: row.get::<_, i64>(13)? == 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_repo() -> SqliteRepository {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        // Leak the tempdir so the file survives for the repo's lifetime in this test.
        std::mem::forget(dir);
        SqliteRepository::new(path.to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn watched_market_upsert_then_delete() {
        let repo = tmp_repo();
        let wm = WatchedMarket {
            market_id: "m1".into(),
            condition_id: "0x00".into(),
            active_positions: 1,
            last_position_at: Utc::now(),
        };
        repo.upsert_watched_market(&wm).await.unwrap();
        let list = repo.list_watched_markets().await.unwrap();
        assert_eq!(list.len(), 1);

        // Re-running the same upsert is idempotent.
        repo.upsert_watched_market(&wm).await.unwrap();
        assert_eq!(repo.list_watched_markets().await.unwrap().len(), 1);

        repo.delete_watched_market("m1").await.unwrap();
        assert!(repo.list_watched_markets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn smart_wallet_trade_dedup_prefers_first_time() {
        let repo = tmp_repo();
        let base = SmartWalletTrade {
            trade_id: "0xaaa...111".into(),
            wallet_address: "0xabc".into(),
            market_id: "1".into(),
            condition_id: "0x01".into(),
            position_id: "t1".into(),
            side: Side::Buy,
            outcome: "YES".into(),
            price: 0.5,
            size: 100.0,
            value: 50.0,
            market_question: "Will X happen?".into(),
            is_first_time: false,
            timestamp: Utc::now(),
            price_is_default: false,
        };
        repo.upsert_smart_wallet_trade(&base).await.unwrap();

        let mut first = base.clone();
        first.is_first_time = true;
        repo.upsert_smart_wallet_trade(&first).await.unwrap();

        let fetched = repo.get_smart_wallet_trade(&base.trade_id).await.unwrap().unwrap();
        assert!(fetched.is_first_time);
    }
}
