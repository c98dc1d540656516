//! HTTP-gateway `Repository` implementation — the other arm of the
//! collapsed `SKIP_DB` switch (REDESIGN FLAGS, spec §9). Proxies every
//! `Repository` method through a REST gateway instead of touching sqlite
//! directly, following the `scrapers/dome_tracker.rs` /
//! `scrapers/polymarket_api.rs` reqwest-client style.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::db::repository::Repository;
use crate::models::*;

pub struct HttpGatewayRepository {
    client: Client,
    base_url: String,
}

impl HttpGatewayRepository {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build gateway http client")?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Repository for HttpGatewayRepository {
    async fn upsert_watched_market(&self, wm: &WatchedMarket) -> Result<()> {
        self.client
            .post(self.url("/watched_markets"))
            .json(wm)
            .send()
            .await
            .context("POST /watched_markets")?
            .error_for_status()
            .context("gateway upsert_watched_market status")?;
        Ok(())
    }

    async fn list_watched_markets(&self) -> Result<Vec<WatchedMarket>> {
        let resp = self
            .client
            .get(self.url("/watched_markets"))
            .send()
            .await
            .context("GET /watched_markets")?
            .error_for_status()
            .context("gateway list_watched_markets status")?;
        Ok(resp.json().await.context("parse watched_markets")?)
    }

    async fn delete_watched_market(&self, market_id: &str) -> Result<()> {
        self.client
            .delete(self.url(&format!("/watched_markets/{market_id}")))
            .send()
            .await
            .context("DELETE /watched_markets/{id}")?
            .error_for_status()
            .context("gateway delete_watched_market status")?;
        Ok(())
    }

    async fn list_positions_for_wallet(&self, wallet_address: &str) -> Result<Vec<Position>> {
        let resp = self
            .client
            .get(self.url("/positions"))
            .query(&[("user", wallet_address), ("limit", "100")])
            .send()
            .await
            .context("GET /positions")?
            .error_for_status()
            .context("gateway list_positions_for_wallet status")?;
        Ok(resp.json().await.context("parse positions")?)
    }

    async fn list_positions_with_tpsl(&self, limit: usize) -> Result<Vec<Position>> {
        let resp = self
            .client
            .get(self.url("/positions/with_tpsl"))
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .context("GET /positions/with_tpsl")?
            .error_for_status()
            .context("gateway list_positions_with_tpsl status")?;
        Ok(resp.json().await.context("parse positions/with_tpsl")?)
    }

    async fn upsert_position(&self, p: &Position) -> Result<()> {
        self.client
            .post(self.url("/positions"))
            .json(p)
            .send()
            .await
            .context("POST /positions")?
            .error_for_status()
            .context("gateway upsert_position status")?;
        Ok(())
    }

    async fn all_tracked_wallets(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(self.url("/wallets"))
            .send()
            .await
            .context("GET /wallets")?
            .error_for_status()
            .context("gateway all_tracked_wallets status")?;
        Ok(resp.json().await.context("parse wallets")?)
    }

    async fn get_active_allocation(&self, follower_id: i64) -> Result<Option<CopyAllocation>> {
        let resp = self
            .client
            .get(self.url(&format!("/copy_allocations/{follower_id}")))
            .send()
            .await
            .context("GET /copy_allocations/{id}")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(
            resp.error_for_status()
                .context("gateway get_active_allocation status")?
                .json()
                .await
                .context("parse copy_allocation")?,
        ))
    }

    async fn upsert_allocation(&self, alloc: &CopyAllocation) -> Result<()> {
        self.client
            .post(self.url("/copy_allocations"))
            .json(alloc)
            .send()
            .await
            .context("POST /copy_allocations")?
            .error_for_status()
            .context("gateway upsert_allocation status")?;
        Ok(())
    }

    async fn list_active_allocations_for_leader(&self, leader_address: &str) -> Result<Vec<CopyAllocation>> {
        let resp = self
            .client
            .get(self.url("/copy_allocations/by_leader"))
            .query(&[("leader_address", leader_address.to_lowercase())])
            .send()
            .await
            .context("GET /copy_allocations/by_leader")?
            .error_for_status()
            .context("gateway list_active_allocations_for_leader status")?;
        Ok(resp.json().await.context("parse copy_allocations/by_leader")?)
    }

    async fn get_position(&self, user_id: i64, market_id: &str, outcome_index: usize) -> Result<Option<Position>> {
        let resp = self
            .client
            .get(self.url("/positions/lookup"))
            .query(&[
                ("user_id", user_id.to_string()),
                ("market_id", market_id.to_string()),
                ("outcome_index", outcome_index.to_string()),
            ])
            .send()
            .await
            .context("GET /positions/lookup")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(
            resp.error_for_status()
                .context("gateway get_position status")?
                .json()
                .await
                .context("parse position")?,
        ))
    }

    async fn find_watched_address(&self, address: &str) -> Result<Option<WatchedAddress>> {
        let resp = self
            .client
            .get(self.url(&format!("/watched_addresses/{}", address.to_lowercase())))
            .send()
            .await
            .context("GET /watched_addresses/{addr}")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(
            resp.error_for_status()
                .context("gateway find_watched_address status")?
                .json()
                .await
                .context("parse watched_address")?,
        ))
    }

    async fn insert_watched_address(&self, wa: &WatchedAddress) -> Result<WatchedAddress> {
        let resp = self
            .client
            .post(self.url("/watched_addresses"))
            .json(wa)
            .send()
            .await
            .context("POST /watched_addresses")?
            .error_for_status()
            .context("gateway insert_watched_address status")?;
        Ok(resp.json().await.context("parse inserted watched_address")?)
    }

    async fn bot_user_id_for_address(&self, _address: &str) -> Result<Option<i64>> {
        Ok(None)
    }

    async fn get_raw_trade(&self, tx_id: &str) -> Result<Option<LeaderTrade>> {
        let resp = self
            .client
            .get(self.url(&format!("/tracked_leader_trades/{tx_id}")))
            .send()
            .await
            .context("GET /tracked_leader_trades/{id}")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(
            resp.error_for_status()
                .context("gateway get_raw_trade status")?
                .json()
                .await
                .context("parse leader trade")?,
        ))
    }

    async fn list_raw_trades_since(&self, since: DateTime<Utc>) -> Result<Vec<LeaderTrade>> {
        let resp = self
            .client
            .get(self.url("/tracked_leader_trades"))
            .query(&[("since", since.to_rfc3339())])
            .send()
            .await
            .context("GET /tracked_leader_trades")?
            .error_for_status()
            .context("gateway list_raw_trades_since status")?;
        Ok(resp.json().await.context("parse leader trades")?)
    }

    async fn get_smart_wallet_trade(&self, trade_id: &str) -> Result<Option<SmartWalletTrade>> {
        let resp = self
            .client
            .get(self.url(&format!("/smart_wallet_trades/{trade_id}")))
            .send()
            .await
            .context("GET /smart_wallet_trades/{id}")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(
            resp.error_for_status()
                .context("gateway get_smart_wallet_trade status")?
                .json()
                .await
                .context("parse smart_wallet_trade")?,
        ))
    }

    async fn upsert_smart_wallet_trade(&self, t: &SmartWalletTrade) -> Result<()> {
        self.client
            .post(self.url("/smart_wallet_trades"))
            .json(t)
            .send()
            .await
            .context("POST /smart_wallet_trades")?
            .error_for_status()
            .context("gateway upsert_smart_wallet_trade status")?;
        Ok(())
    }

    async fn has_prior_trade_in_condition(
        &self,
        wallet_address: &str,
        condition_id: &str,
        before: DateTime<Utc>,
    ) -> Result<bool> {
        let resp: serde_json::Value = self
            .client
            .get(self.url("/smart_wallet_trades/prior_exists"))
            .query(&[
                ("wallet_address", wallet_address),
                ("condition_id", condition_id),
                ("before", &before.to_rfc3339()),
            ])
            .send()
            .await
            .context("GET /smart_wallet_trades/prior_exists")?
            .error_for_status()
            .context("gateway has_prior_trade_in_condition status")?
            .json()
            .await
            .context("parse prior_exists")?;
        Ok(resp.get("exists").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn insert_invalid_trade(&self, tx_id: &str, reason: &str) -> Result<()> {
        self.client
            .post(self.url("/smart_wallet_trades_invalid"))
            .json(&serde_json::json!({"tx_id": tx_id, "reason": reason}))
            .send()
            .await
            .context("POST /smart_wallet_trades_invalid")?
            .error_for_status()
            .context("gateway insert_invalid_trade status")?;
        Ok(())
    }

    async fn is_already_shared(&self, trade_id: &str) -> Result<bool> {
        let resp: serde_json::Value = self
            .client
            .get(self.url(&format!("/smart_wallet_trades_to_share/{trade_id}")))
            .send()
            .await
            .context("GET /smart_wallet_trades_to_share/{id}")?
            .json()
            .await
            .unwrap_or(serde_json::json!({"exists": false}));
        Ok(resp.get("exists").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn append_to_share_feed(&self, t: &SmartWalletTrade) -> Result<()> {
        self.client
            .post(self.url("/smart_wallet_trades_to_share"))
            .json(t)
            .send()
            .await
            .context("POST /smart_wallet_trades_to_share")?
            .error_for_status()
            .context("gateway append_to_share_feed status")?;
        Ok(())
    }

    async fn get_smart_wallet(&self, address: &str) -> Result<Option<SmartWallet>> {
        let resp = self
            .client
            .get(self.url(&format!("/smart_wallets/{}", address.to_lowercase())))
            .send()
            .await
            .context("GET /smart_wallets/{addr}")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(
            resp.error_for_status()
                .context("gateway get_smart_wallet status")?
                .json()
                .await
                .context("parse smart_wallet")?,
        ))
    }
}
