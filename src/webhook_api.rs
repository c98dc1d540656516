//! Component G: Webhook Dispatcher (spec §4.D/§6 "Webhook endpoints").
//! Axum router receiving POSTs from the Pub/Sub Bridge plus the
//! webhook-instant smart-wallet ingestion trigger, following
//! `api/routes.rs`'s extractor/handler shape adapted to this crate's own
//! `AppState`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::copy_trading::CopyTradingEngine;
use crate::db::repository::Repository;
use crate::metrics::Metrics;
use crate::models::{LeaderTrade, Side};
use crate::smart_wallet::ingestion::ingest_webhook_trade;
use crate::smart_wallet::shareable::FilterStats;
use crate::store::MarketStore;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub store: Arc<MarketStore>,
    pub copy_trading: Arc<CopyTradingEngine>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/wh/market", post(handle_market_webhook))
        .route("/wh/copy_trade", post(handle_copy_trade_webhook))
        .route("/wh/smart_wallet_trade", post(handle_smart_wallet_trade_webhook))
        .route("/healthz", get(handle_health))
        .route("/metrics", get(crate::metrics::handle_metrics))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct MarketWebhookPayload {
    market_id: String,
    event: String,
    #[allow(dead_code)]
    payload: serde_json::Value,
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
}

/// `POST /wh/market` (spec §6): the Pub/Sub Bridge's market-event sink.
/// Accepts 200/201 per spec; this core has no further downstream notifier
/// (out of scope, spec §1), so it just records the delivery.
async fn handle_market_webhook(
    State(state): State<AppState>,
    Json(body): Json<MarketWebhookPayload>,
) -> StatusCode {
    state.metrics.bridge_market_webhook_received.increment(1);
    info!(market_id = %body.market_id, event = %body.event, "market webhook received");
    StatusCode::OK
}

/// Wire shape of the `copy_trade:*` channel payload (spec §6).
#[derive(Debug, Deserialize)]
struct CopyTradeWebhookPayload {
    tx_id: String,
    user_address: String,
    market_id: String,
    outcome: String,
    tx_type: String,
    amount: f64,
    #[serde(default)]
    price: Option<f64>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    address_type: Option<String>,
}

fn outcome_index_for(store: &MarketStore, market_id: &str, outcome: &str) -> u8 {
    store
        .get_market(market_id, true)
        .and_then(|m| m.outcome_index(outcome))
        .unwrap_or(if outcome.eq_ignore_ascii_case("NO") { 0 } else { 1 }) as u8
}

/// `POST /wh/copy_trade` (spec §6): the bridge relays a normalized
/// leader-wallet fill here; translate it into a `LeaderTrade` and fan it
/// out through the copy-trading engine (spec §4.H).
async fn handle_copy_trade_webhook(
    State(state): State<AppState>,
    Json(body): Json<CopyTradeWebhookPayload>,
) -> StatusCode {
    let side = match body.tx_type.to_uppercase().as_str() {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        other => {
            warn!(tx_type = other, "copy_trade webhook: unrecognized tx_type");
            return StatusCode::BAD_REQUEST;
        }
    };
    let outcome_index = outcome_index_for(&state.store, &body.market_id, &body.outcome);

    let trade = LeaderTrade {
        tx_id: body.tx_id,
        wallet_address: body.user_address.to_lowercase(),
        market_id: body.market_id,
        outcome_index,
        side,
        size: body.amount,
        price: body.price,
        amount_usd: body.price.map(|p| p * body.amount),
        timestamp: body.timestamp,
        is_smart_wallet: body.address_type.as_deref() == Some("external_leader"),
        leader_wallet_balance: None,
    };

    state.metrics.bridge_copy_trade_webhook_received.increment(1);
    if let Err(e) = state.copy_trading.on_leader_trade(&trade).await {
        warn!(error = %e, tx_id = %trade.tx_id, "copy_trade webhook: engine errored");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct SmartWalletTradeWebhookPayload {
    tx_id: String,
}

#[derive(Debug, Serialize)]
struct SmartWalletTradeWebhookResponse {
    accepted: bool,
    shareable: bool,
}

/// Webhook-instant ingestion trigger (spec §4.I): "an external webhook
/// posts a single `trade_id`". Not itself one of spec §6's downstream
/// webhook endpoints, but the receiving side that path requires.
async fn handle_smart_wallet_trade_webhook(
    State(state): State<AppState>,
    Json(body): Json<SmartWalletTradeWebhookPayload>,
) -> (StatusCode, Json<SmartWalletTradeWebhookResponse>) {
    let mut stats = FilterStats::default();
    match ingest_webhook_trade(&body.tx_id, state.repo.as_ref(), state.store.as_ref(), &mut stats).await {
        Ok(Some(_)) => {
            state.metrics.smart_wallet_trades_ingested.increment(1);
            (
                StatusCode::OK,
                Json(SmartWalletTradeWebhookResponse { accepted: true, shareable: stats.qualified > 0 }),
            )
        }
        Ok(None) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(SmartWalletTradeWebhookResponse { accepted: false, shareable: false }),
        ),
        Err(e) => {
            warn!(error = %e, tx_id = %body.tx_id, "smart_wallet_trade webhook errored");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SmartWalletTradeWebhookResponse { accepted: false, shareable: false }),
            )
        }
    }
}

async fn handle_health() -> StatusCode {
    StatusCode::OK
}
