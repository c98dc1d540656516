//! Live execution against the Polymarket CLOB (spec §6). HMAC L2 auth
//! ported verbatim from `vault/execution.rs::sign_request`.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::exchange::{ExecutionAdapter, OrderAck, OrderBook, OrderRequest, OrderSide, PriceLevel, TimeInForce};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct PolymarketClobCredentials {
    pub address: String,
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
    pub funder_address: Option<String>,
}

impl PolymarketClobCredentials {
    pub fn from_config(cfg: &Config) -> Option<Self> {
        Some(Self {
            address: cfg.poly_address.clone()?,
            api_key: cfg.poly_api_key.clone()?,
            secret: cfg.poly_api_secret.clone()?,
            passphrase: cfg.poly_api_passphrase.clone()?,
            funder_address: cfg.poly_funder_address.clone(),
        })
    }
}

#[derive(Clone)]
pub struct PolymarketClobAdapter {
    client: reqwest::Client,
    creds: PolymarketClobCredentials,
    host: String,
}

impl std::fmt::Debug for PolymarketClobAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolymarketClobAdapter")
            .field("host", &self.host)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ClobOrderPayload {
    #[serde(rename = "tokenID")]
    token_id: String,
    price: String,
    size: String,
    side: String,
    #[serde(rename = "orderType", skip_serializing_if = "Option::is_none")]
    order_type: Option<String>,
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    time_in_force: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClobOrderResponse {
    #[serde(rename = "orderID", alias = "orderId", alias = "order_id")]
    order_id: Option<String>,
    #[serde(rename = "errorMsg", alias = "error", default)]
    error_msg: Option<String>,
    #[serde(rename = "filledSize", alias = "filled_size", default)]
    filled_size: Option<String>,
    #[serde(rename = "avgPrice", alias = "avg_price", default)]
    avg_price: Option<String>,
}

impl PolymarketClobAdapter {
    pub fn new(host: String, creds: PolymarketClobCredentials) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::Fatal(format!("failed to build CLOB http client: {e}")))?;
        Ok(Self { client, creds, host })
    }

    pub async fn get_account_balance(&self) -> CoreResult<f64> {
        let path = "/balance-allowance?signature_type=2";
        let headers = self.auth_headers("GET", path, "")?;
        let url = format!("{}{}", self.host, path);

        let mut request = self.client.get(&url);
        for (key, value) in headers {
            request = request.header(&key, &value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("balance request: {e}")))?;
        let status = response.status();
        let resp_text = response.text().await.unwrap_or_default();
        debug!(status = %status, "balance API response");

        if !status.is_success() {
            return Err(CoreError::UpstreamUnavailable(format!(
                "balance request failed ({status}): {resp_text}"
            )));
        }

        if let Ok(map) =
            serde_json::from_str::<std::collections::HashMap<String, serde_json::Value>>(&resp_text)
        {
            if let Some(bal_val) = map.get("balance") {
                if let Some(bal) = bal_val.as_f64() {
                    return Ok(bal);
                }
                if let Some(bal_str) = bal_val.as_str() {
                    if let Ok(bal) = bal_str.parse::<f64>() {
                        return Ok(bal / 1_000_000.0);
                    }
                }
            }
        }
        warn!(response = %resp_text, "could not parse balance response");
        Ok(0.0)
    }

    /// Message format: `timestamp + method + path + body`, HMAC-SHA256 over
    /// the base64-decoded secret, url-safe base64-encoded signature.
    fn sign_request(&self, method: &str, path: &str, body: &str, timestamp: i64) -> CoreResult<String> {
        let message = format!("{timestamp}{method}{path}{body}");

        let secret_bytes = URL_SAFE
            .decode(&self.creds.secret)
            .or_else(|_| URL_SAFE_NO_PAD.decode(&self.creds.secret))
            .or_else(|_| BASE64.decode(&self.creds.secret))
            .map_err(|e| CoreError::Fatal(format!("failed to decode CLOB secret: {e}")))?;

        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| CoreError::Fatal(format!("HMAC key error: {e}")))?;
        mac.update(message.as_bytes());

        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    fn auth_headers(&self, method: &str, path: &str, body: &str) -> CoreResult<Vec<(String, String)>> {
        let timestamp = Utc::now().timestamp();
        let signature = self.sign_request(method, path, body, timestamp)?;

        Ok(vec![
            ("POLY_ADDRESS".to_string(), self.creds.address.clone()),
            ("POLY_API_KEY".to_string(), self.creds.api_key.clone()),
            ("POLY_SIGNATURE".to_string(), signature),
            ("POLY_TIMESTAMP".to_string(), timestamp.to_string()),
            ("POLY_PASSPHRASE".to_string(), self.creds.passphrase.clone()),
        ])
    }
}

#[async_trait::async_trait]
impl ExecutionAdapter for PolymarketClobAdapter {
    async fn place_order(&self, req: OrderRequest) -> CoreResult<OrderAck> {
        req.validate()?;
        let start = std::time::Instant::now();

        let size = req.notional_usdc / req.price;
        let side_str = match req.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let tif_str = match req.tif {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        };

        let payload = ClobOrderPayload {
            token_id: req.token_id.clone(),
            price: format!("{:.4}", req.price),
            size: format!("{size:.6}"),
            side: side_str.to_string(),
            order_type: Some("LIMIT".to_string()),
            time_in_force: Some(tif_str.to_string()),
        };

        let body = serde_json::to_string(&payload)
            .map_err(|e| CoreError::Fatal(format!("failed to serialize order: {e}")))?;
        let path = "/order";
        let headers = self.auth_headers("POST", path, &body)?;

        debug!(
            token_id = %req.token_id, side = %side_str, price = %req.price,
            size = %size, notional = %req.notional_usdc, "CLOB order submission"
        );

        let url = format!("{}{}", self.host, path);
        let mut request = self.client.post(&url).header("Content-Type", "application/json");
        for (key, value) in headers {
            request = request.header(&key, &value);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("CLOB request failed: {e}")))?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::UpstreamThrottled("CLOB rate limited".into()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, latency_ms = %latency_ms, "CLOB order rejected");
            return Err(map_clob_rejection(status, &error_text));
        }

        let resp_text = response
            .text()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("failed to read response: {e}")))?;
        let resp: ClobOrderResponse = serde_json::from_str(&resp_text)
            .map_err(|e| CoreError::ParseError(format!("failed to parse CLOB response: {e}")))?;

        if let Some(err) = resp.error_msg.filter(|e| !e.is_empty()) {
            return Err(map_clob_rejection(status, &err));
        }

        let order_id = resp
            .order_id
            .unwrap_or_else(|| format!("clob:{}", req.client_order_id));
        let filled_size: f64 = resp.filled_size.and_then(|s| s.parse().ok()).unwrap_or(size);
        let filled_price: f64 = resp.avg_price.and_then(|s| s.parse().ok()).unwrap_or(req.price);
        let filled_notional = filled_size * filled_price;
        let fees_usdc = filled_notional * 0.005;

        info!(order_id = %order_id, filled_size = %filled_size, filled_price = %filled_price, latency_ms = %latency_ms, "CLOB order filled");

        Ok(OrderAck {
            order_id,
            filled_notional_usdc: filled_notional,
            filled_price,
            filled_at: Utc::now(),
            filled_tokens: filled_size,
            fees_usdc,
            slippage_bps: 0.0,
            latency_ms,
            tx_hash: None,
        })
    }

    async fn get_balance(&self) -> CoreResult<f64> {
        self.get_account_balance().await
    }

    async fn get_token_balance(&self, token_id: &str) -> CoreResult<f64> {
        let path = format!("/balance-allowance?signature_type=2&asset_type=CONDITIONAL&token_id={token_id}");
        let headers = self.auth_headers("GET", &path, "")?;
        let url = format!("{}{}", self.host, path);

        let mut request = self.client.get(&url);
        for (key, value) in headers {
            request = request.header(&key, &value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("token balance request: {e}")))?;
        let status = response.status();
        let resp_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CoreError::UpstreamUnavailable(format!(
                "token balance request failed ({status}): {resp_text}"
            )));
        }
        if let Ok(map) =
            serde_json::from_str::<std::collections::HashMap<String, serde_json::Value>>(&resp_text)
        {
            if let Some(bal_val) = map.get("balance") {
                if let Some(bal) = bal_val.as_f64() {
                    return Ok(bal);
                }
                if let Some(bal_str) = bal_val.as_str() {
                    if let Ok(bal) = bal_str.parse::<f64>() {
                        return Ok(bal / 1_000_000.0);
                    }
                }
            }
        }
        warn!(response = %resp_text, "could not parse token balance response");
        Ok(0.0)
    }

    async fn get_order_book(&self, token_id: &str) -> CoreResult<OrderBook> {
        let path = "/books";
        let body = serde_json::to_string(&serde_json::json!([{"token_id": token_id}]))
            .map_err(|e| CoreError::Fatal(format!("serialize books request: {e}")))?;
        let url = format!("{}{}", self.host, path);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("books request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::UpstreamUnavailable(format!("books request failed: {status}")));
        }
        let books: Vec<RawBookLevelSet> = response
            .json()
            .await
            .map_err(|e| CoreError::ParseError(format!("parse books response: {e}")))?;
        let book = books.into_iter().next().ok_or_else(|| CoreError::NotFound(format!("no book for {token_id}")))?;
        Ok(OrderBook {
            bids: book.bids.into_iter().map(|l| l.into()).collect(),
            asks: book.asks.into_iter().map(|l| l.into()).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawBookLevelSet {
    #[serde(default)]
    bids: Vec<RawBookLevel>,
    #[serde(default)]
    asks: Vec<RawBookLevel>,
}

#[derive(Debug, Deserialize)]
struct RawBookLevel {
    price: String,
    size: String,
}

impl From<RawBookLevel> for PriceLevel {
    fn from(l: RawBookLevel) -> Self {
        PriceLevel {
            price: l.price.parse().unwrap_or(0.0),
            size: l.size.parse().unwrap_or(0.0),
        }
    }
}

fn map_clob_rejection(status: reqwest::StatusCode, text: &str) -> CoreError {
    let lower = text.to_lowercase();
    if lower.contains("not enough balance") || lower.contains("insufficient") {
        CoreError::InsufficientFunds { needed: 0.0, available: 0.0 }
    } else if lower.contains("market") && (lower.contains("closed") || lower.contains("inactive")) {
        CoreError::MarketClosed(text.to_string())
    } else if status.is_server_error() {
        CoreError::UpstreamUnavailable(format!("CLOB {status}: {text}"))
    } else {
        CoreError::ValidationError(format!("CLOB order rejected ({status}): {text}"))
    }
}
