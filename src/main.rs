//! Composition root: loads `Config`, builds every component, and spawns
//! each long-running loop under the supervisor (spec §5, §7). The webhook
//! dispatcher (component G) and the metrics endpoint share one axum
//! listener.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use betterbot_backend::bridge::PubSubBridge;
use betterbot_backend::config::Config;
use betterbot_backend::copy_trading::CopyTradingEngine;
use betterbot_backend::db::repository::Repository;
use betterbot_backend::db::{HttpGatewayRepository, SqliteRepository};
use betterbot_backend::exchange::paper::{PaperExecutionAdapter, PaperExecutionConfig};
use betterbot_backend::exchange::polymarket_clob::{PolymarketClobAdapter, PolymarketClobCredentials};
use betterbot_backend::exchange::ExecutionAdapter;
use betterbot_backend::metrics::Metrics;
use betterbot_backend::poller::MarketPoller;
use betterbot_backend::positions::{ExchangePositionsClient, PositionCache, PositionsClient};
use betterbot_backend::smart_wallet::SmartWalletSync;
use betterbot_backend::store::MarketStore;
use betterbot_backend::streamer::{new_watched_set, WsStreamer};
use betterbot_backend::supervisor::supervise;
use betterbot_backend::tpsl::TpslMonitor;
use betterbot_backend::watched_markets::WatchedMarketsController;
use betterbot_backend::webhook_api::{self, AppState};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_repository(cfg: &Config) -> anyhow::Result<Arc<dyn Repository>> {
    if cfg.skip_db {
        info!(base_url = %cfg.exchange_data_api_url, "repository: http gateway (SKIP_DB)");
        Ok(Arc::new(HttpGatewayRepository::new(cfg.exchange_data_api_url.clone())?))
    } else {
        info!(db = %cfg.database_url, "repository: direct sqlite");
        Ok(Arc::new(SqliteRepository::new(&cfg.database_url)?))
    }
}

fn build_exchange(cfg: &Config) -> anyhow::Result<Arc<dyn ExecutionAdapter>> {
    if cfg.dry_run {
        info!("execution adapter: paper (DRY_RUN=true)");
        Ok(Arc::new(PaperExecutionAdapter::new(PaperExecutionConfig::from_env())))
    } else {
        let creds = PolymarketClobCredentials::from_config(cfg)
            .context("DRY_RUN=false requires POLY_ADDRESS/POLYMARKET_API_KEY/SECRET/PASSPHRASE")?;
        info!(address = %creds.address, "execution adapter: live Polymarket CLOB");
        Ok(Arc::new(PolymarketClobAdapter::new(cfg.clob_api_url.clone(), creds)?))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cfg = Config::from_env().context("load configuration")?;
    info!(skip_db = cfg.skip_db, dry_run = cfg.dry_run, "starting core");

    let repo = build_repository(&cfg)?;
    let exchange = build_exchange(&cfg)?;
    let store = Arc::new(MarketStore::new());
    let watched_set = new_watched_set();

    let metrics_handle = betterbot_backend::metrics::install();
    let metrics = Arc::new(Metrics::new());

    let positions_client: Arc<dyn PositionsClient> =
        Arc::new(ExchangePositionsClient::new(cfg.exchange_data_api_url.clone(), Some(store.clone()))?);
    let position_cache = Arc::new(PositionCache::new(std::time::Duration::from_secs(cfg.position_cache_ttl_sec)));

    let poller = Arc::new(MarketPoller::new(&cfg, store.clone())?);
    let streamer = Arc::new(WsStreamer::new(&cfg, store.clone(), watched_set.clone()));
    let bridge = Arc::new(PubSubBridge::new(&cfg, metrics.clone())?);

    let watched_markets = Arc::new(WatchedMarketsController::new(
        &cfg,
        repo.clone(),
        store.clone(),
        positions_client.clone(),
        position_cache.clone(),
        watched_set.clone(),
    ));

    let copy_trading = Arc::new(CopyTradingEngine::new(
        repo.clone(),
        store.clone(),
        exchange.clone(),
        cfg.min_copy_amount_usd,
        cfg.min_allocation_percentage,
        cfg.max_allocation_percentage,
    ));

    let smart_wallet_sync = Arc::new(SmartWalletSync::new(repo.clone(), store.clone(), &cfg));
    let tpsl_monitor = Arc::new(TpslMonitor::new(
        repo.clone(),
        store.clone(),
        exchange.clone(),
        positions_client.clone(),
        &cfg,
    ));

    let app_state = AppState { repo: repo.clone(), store: store.clone(), copy_trading: copy_trading.clone(), metrics: metrics.clone() };
    let listener = TcpListener::bind((cfg.webhook_listen_host.as_str(), cfg.webhook_listen_port))
        .await
        .with_context(|| format!("bind webhook listener on {}:{}", cfg.webhook_listen_host, cfg.webhook_listen_port))?;
    info!(addr = %listener.local_addr()?, "webhook dispatcher listening");
    let router = webhook_api::router(app_state);
    let _ = &metrics_handle;

    supervise("market_poller", {
        let poller = poller.clone();
        move || {
            let poller = poller.clone();
            async move { poller.run().await.map_err(Into::into) }
        }
    });

    supervise("ws_streamer", {
        let streamer = streamer.clone();
        move || {
            let streamer = streamer.clone();
            async move { streamer.run().await.map_err(Into::into) }
        }
    });

    supervise("pubsub_bridge", {
        let bridge = bridge.clone();
        move || {
            let bridge = bridge.clone();
            async move { bridge.run().await.map_err(Into::into) }
        }
    });

    supervise("watched_markets", {
        let watched_markets = watched_markets.clone();
        let streamer = streamer.clone();
        move || {
            let watched_markets = watched_markets.clone();
            let streamer = streamer.clone();
            async move { watched_markets.run(move || streamer.request_refresh()).await.map_err(Into::into) }
        }
    });

    supervise("smart_wallet_sync", {
        let smart_wallet_sync = smart_wallet_sync.clone();
        move || {
            let smart_wallet_sync = smart_wallet_sync.clone();
            async move { smart_wallet_sync.run().await }
        }
    });

    supervise("tpsl_monitor", {
        let tpsl_monitor = tpsl_monitor.clone();
        move || {
            let tpsl_monitor = tpsl_monitor.clone();
            async move { tpsl_monitor.run().await }
        }
    });

    axum::serve(listener, router).await.context("webhook dispatcher server")?;
    Ok(())
}
