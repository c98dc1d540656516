//! Ambient observability (SPEC_FULL.md §10): per-component cycle counters
//! exposed on the same axum router as the webhook dispatcher, via the
//! `metrics` + `metrics-exporter-prometheus` stack this crate already
//! depends on. Carried even though "analytics reporting" is a Non-goal —
//! Non-goals scope features, not ambient concerns.

use std::sync::OnceLock;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics::Counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder once per process. Safe to call
/// more than once; later calls are no-ops.
pub fn install() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("install prometheus recorder")
        })
        .clone()
}

/// Named counter handles for every cycle/error tally SPEC_FULL.md §10 calls
/// out: poller cycles, streamer reconnects, bridge message/success/error
/// tallies (§4.D), TP/SL triggers fired, smart-wallet trades ingested.
pub struct Metrics {
    pub poller_cycles: Counter,
    pub poller_errors: Counter,
    pub streamer_reconnects: Counter,
    pub streamer_frames_processed: Counter,
    pub bridge_messages_dispatched: Counter,
    pub bridge_dispatch_errors: Counter,
    pub bridge_market_webhook_received: Counter,
    pub bridge_copy_trade_webhook_received: Counter,
    pub watched_markets_cycles: Counter,
    pub copy_trades_executed: Counter,
    pub copy_trades_skipped: Counter,
    pub tpsl_triggers_fired: Counter,
    pub tpsl_trigger_failures: Counter,
    pub smart_wallet_trades_ingested: Counter,
    pub smart_wallet_trades_shared: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            poller_cycles: metrics::counter!("poller_cycles_total"),
            poller_errors: metrics::counter!("poller_errors_total"),
            streamer_reconnects: metrics::counter!("streamer_reconnects_total"),
            streamer_frames_processed: metrics::counter!("streamer_frames_processed_total"),
            bridge_messages_dispatched: metrics::counter!("bridge_messages_dispatched_total"),
            bridge_dispatch_errors: metrics::counter!("bridge_dispatch_errors_total"),
            bridge_market_webhook_received: metrics::counter!("bridge_market_webhook_received_total"),
            bridge_copy_trade_webhook_received: metrics::counter!("bridge_copy_trade_webhook_received_total"),
            watched_markets_cycles: metrics::counter!("watched_markets_cycles_total"),
            copy_trades_executed: metrics::counter!("copy_trades_executed_total"),
            copy_trades_skipped: metrics::counter!("copy_trades_skipped_total"),
            tpsl_triggers_fired: metrics::counter!("tpsl_triggers_fired_total"),
            tpsl_trigger_failures: metrics::counter!("tpsl_trigger_failures_total"),
            smart_wallet_trades_ingested: metrics::counter!("smart_wallet_trades_ingested_total"),
            smart_wallet_trades_shared: metrics::counter!("smart_wallet_trades_shared_total"),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /metrics`: renders the Prometheus text exposition format.
pub async fn handle_metrics() -> impl IntoResponse {
    let body = install().render();
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
