//! Component D: Pub/Sub Bridge (spec §4.D). Pattern-subscribes to the
//! publisher's channels and POSTs each message to a webhook dispatcher
//! (component G, out of process). POST shape follows the `api/routes.rs` axum/reqwest
//! conventions, `redis` crate grounded as in `publisher/mod.rs`.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::metrics::Metrics;

const PATTERNS: &[&str] = &["market.status.*", "trade.*", "orderbook.*", "copy_trade:*"];

pub struct PubSubBridge {
    redis_url: String,
    http: reqwest::Client,
    market_webhook_url: String,
    copy_trade_webhook_url: String,
    metrics: Arc<Metrics>,
}

impl PubSubBridge {
    pub fn new(cfg: &Config, metrics: Arc<Metrics>) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| CoreError::Fatal(format!("build bridge http client: {e}")))?;
        Ok(Self {
            redis_url: cfg.redis_url.clone(),
            http,
            market_webhook_url: cfg.redis_bridge_webhook_url.clone(),
            copy_trade_webhook_url: cfg.redis_bridge_copy_trade_webhook_url.clone(),
            metrics,
        })
    }

    pub async fn run(&self) -> CoreResult<()> {
        let client = redis::Client::open(self.redis_url.clone())
            .map_err(|e| CoreError::Fatal(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_async_connection()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("redis bridge connect: {e}")))?;
        let mut pubsub = conn.into_pubsub();

        for pattern in PATTERNS {
            pubsub
                .psubscribe(*pattern)
                .await
                .map_err(|e| CoreError::UpstreamUnavailable(format!("psubscribe {pattern}: {e}")))?;
        }

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let channel: String = msg.get_channel_name().to_string();
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "failed to read redis message payload");
                    continue;
                }
            };
            self.metrics.bridge_messages_dispatched.increment(1);
            if let Err(e) = self.dispatch(&channel, &payload).await {
                self.metrics.bridge_dispatch_errors.increment(1);
                warn!(channel = %channel, error = %e, "webhook dispatch failed");
            }
        }

        Err(CoreError::Transient("redis pubsub stream ended".into()))
    }

    async fn dispatch(&self, channel: &str, payload: &str) -> CoreResult<()> {
        let value: serde_json::Value =
            serde_json::from_str(payload).unwrap_or_else(|_| serde_json::json!({"raw_message": payload}));

        if let Some(wallet) = channel.strip_prefix("copy_trade:") {
            debug!(wallet, "forwarding copy_trade event");
            self.post(&self.copy_trade_webhook_url, &value).await?;
            return Ok(());
        }

        // market_id is everything after the second '.'/':' delimiter
        // (`market.status.m123` -> `m123`); channels with only one
        // delimiter (`trade.m123`) have no "second" split point, so fall
        // back to everything after the first.
        let parts: Vec<&str> = channel.splitn(3, |c| c == '.' || c == ':').collect();
        let market_id = match parts.len() {
            3 => parts[2].to_string(),
            2 => parts[1].to_string(),
            _ => channel.to_string(),
        };
        let event = channel.split(['.', ':']).next().unwrap_or("").to_string();

        let envelope = serde_json::json!({
            "market_id": market_id,
            "event": event,
            "payload": value,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.post(&self.market_webhook_url, &envelope).await
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> CoreResult<()> {
        self.http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("webhook POST {url}: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::UpstreamUnavailable(format!("webhook {url} status: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    fn extract_market_id(channel: &str) -> String {
        let parts: Vec<&str> = channel.splitn(3, |c| c == '.' || c == ':').collect();
        match parts.len() {
            3 => parts[2].to_string(),
            2 => parts[1].to_string(),
            _ => channel.to_string(),
        }
    }

    #[test]
    fn two_level_channel_splits_after_second_delimiter() {
        assert_eq!(extract_market_id("market.status.m123"), "m123");
    }

    #[test]
    fn one_level_channel_falls_back_to_after_first_delimiter() {
        assert_eq!(extract_market_id("trade.m123"), "m123");
    }
}
