//! Component E: Redis Publisher (spec §2, §4.E). Non-blocking fan-out of
//! indexer-observed fills to `trade.{market}` and `copy_trade:{wallet}`
//! channels. Per spec §2's data-flow table, E's only producer is the
//! on-chain indexer (component D, explicitly "ext." / out of scope) and its
//! only consumer is the Bridge (component F, `bridge::PubSubBridge`, which
//! we do own). This binary never calls it directly for the same reason it
//! doesn't implement the indexer: it's a library capability this crate
//! exports for that out-of-process indexer to depend on, not something our
//! own composition root has a caller for. `redis` crate version/features
//! grounded on `other_examples/manifests/matlinat-poly_hft_bot/Cargo.toml`.

use redis::aio::ConnectionManager;
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::models::LeaderTrade;

/// Lazily connects on first publish and keeps the `ConnectionManager`
/// (which reconnects internally) for the process lifetime, so a publisher
/// with no subscribers yet never blocks startup on a Redis round trip.
pub struct RedisPublisher {
    url: String,
    conn: tokio::sync::Mutex<Option<ConnectionManager>>,
}

impl RedisPublisher {
    pub fn new(url: String) -> Self {
        Self { url, conn: tokio::sync::Mutex::new(None) }
    }

    async fn connection(&self) -> CoreResult<ConnectionManager> {
        let mut guard = self.conn.lock().await;
        if let Some(c) = guard.as_ref() {
            return Ok(c.clone());
        }
        let client = redis::Client::open(self.url.clone())
            .map_err(|e| CoreError::Fatal(format!("invalid redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("redis connect: {e}")))?;
        *guard = Some(manager.clone());
        Ok(manager)
    }

    pub async fn publish_trade(&self, market_id: &str, trade: &LeaderTrade) -> CoreResult<()> {
        let payload = serde_json::to_string(trade)
            .map_err(|e| CoreError::ParseError(format!("serialize trade: {e}")))?;
        self.publish(&format!("trade.{market_id}"), &payload).await
    }

    pub async fn publish_copy_trade(&self, wallet_address: &str, trade: &LeaderTrade) -> CoreResult<()> {
        let payload = serde_json::to_string(trade)
            .map_err(|e| CoreError::ParseError(format!("serialize copy trade: {e}")))?;
        self.publish(&format!("copy_trade:{}", wallet_address.to_lowercase()), &payload).await
    }

    pub async fn publish_market_status(&self, market_id: &str, event: &str) -> CoreResult<()> {
        let payload = serde_json::json!({"market_id": market_id, "event": event}).to_string();
        self.publish(&format!("market.status.{market_id}"), &payload).await
    }

    async fn publish(&self, channel: &str, payload: &str) -> CoreResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| {
                warn!(channel, error = %e, "redis publish failed");
                CoreError::Transient(format!("redis publish: {e}"))
            })
    }
}
