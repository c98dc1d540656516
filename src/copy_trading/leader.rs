//! Leader resolution, 4-tier and deterministic (spec §4.H): a single async
//! function over `Repository` rather than a stateful resolver object.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::db::repository::Repository;
use crate::models::{AddressType, WatchedAddress};

/// Single-writer guarantee on the resolved row: `resolve_leader` is only
/// ever called from the per-wallet-serialized copy-trading ingestion path
/// (spec §5 "Copy-trade mirroring is serialized per follower" extends to
/// leader resolution, since both run on the same worker for a given
/// leader wallet).
pub async fn resolve_leader(repo: &dyn Repository, address: &str) -> anyhow::Result<WatchedAddress> {
    let address = address.to_lowercase();

    // Tier 1: registered bot user.
    if let Some(linked_user_id) = repo.bot_user_id_for_address(&address).await? {
        if let Some(existing) = repo.find_watched_address(&address).await? {
            if existing.address_type == AddressType::BotUser {
                return Ok(existing);
            }
        }
        debug!(address = %address, linked_user_id, "resolved leader as bot_user");
        return repo
            .insert_watched_address(&WatchedAddress {
                id: 0,
                address: address.clone(),
                address_type: AddressType::BotUser,
                linked_user_id: Some(linked_user_id),
                created_at: Utc::now(),
            })
            .await;
    }

    // Tiers 2 and 3: an existing watched-address row, whatever its type.
    if let Some(existing) = repo.find_watched_address(&address).await? {
        debug!(address = %address, address_type = ?existing.address_type, "resolved leader from watched_addresses");
        return Ok(existing);
    }

    // Tier 4: first time we've seen this wallet trade; register it as a
    // copy_leader.
    debug!(address = %address, "no prior watched_address row, registering as copy_leader");
    repo.insert_watched_address(&WatchedAddress {
        id: 0,
        address,
        address_type: AddressType::CopyLeader,
        linked_user_id: None,
        created_at: Utc::now(),
    })
    .await
}

/// Thin `Arc`-friendly wrapper so `copy_trading::engine` doesn't need to
/// hold a bare `&dyn Repository` across an await boundary inside a spawned
/// task.
pub async fn resolve_leader_arc(repo: Arc<dyn Repository>, address: &str) -> anyhow::Result<WatchedAddress> {
    resolve_leader(repo.as_ref(), address).await
}

#[cfg(test)]
mod tests {
    // Exercised via `copy_trading::engine` integration-style tests, which
    // hold an in-memory `Repository` fake; see `engine.rs`.
}
