//! Application configuration (spec §6 "Environment variables", §10 ambient stack).

use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub clob_wss_url: String,
    pub clob_api_url: String,
    pub gamma_api_url: String,

    pub poll_ms: u64,
    pub fast_poll_secs: u64,
    pub keyword_poll_secs: u64,
    pub complete_poll_cycles: u64,

    pub ws_reconnect_backoff_min_ms: u64,
    pub ws_reconnect_backoff_max_ms: u64,
    pub ws_max_subscriptions: usize,

    pub webhook_listen_host: String,
    pub webhook_listen_port: u16,
    pub redis_bridge_webhook_url: String,
    pub redis_bridge_copy_trade_webhook_url: String,

    pub tpsl_check_interval_sec: u64,
    pub smart_sync_interval_sec: u64,

    pub min_copy_amount_usd: f64,
    pub min_allocation_percentage: f64,
    pub max_allocation_percentage: f64,

    pub watched_markets_interval_sec: u64,
    pub position_cache_ttl_sec: u64,

    /// Switch between the direct-DB repository and the HTTP-gateway repository
    /// (collapses the source system's `SKIP_DB` flag behind one trait, see
    /// DESIGN.md REDESIGN FLAGS entry).
    pub skip_db: bool,
    pub exchange_data_api_url: String,

    /// When true, trades are routed through the paper execution adapter
    /// instead of the signed CLOB adapter.
    pub dry_run: bool,

    pub poly_address: Option<String>,
    pub poly_api_key: Option<String>,
    pub poly_api_secret: Option<String>,
    pub poly_api_passphrase: Option<String>,
    pub poly_funder_address: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            database_url: env_string("DATABASE_URL", "./betterbot_core.db"),
            redis_url: env_string("REDIS_URL", "redis://127.0.0.1:6379"),
            clob_wss_url: env_string(
                "CLOB_WSS_URL",
                "wss://ws-subscriptions-clob.polymarket.com/ws/market",
            ),
            clob_api_url: env_string("CLOB_API_URL", "https://clob.polymarket.com"),
            gamma_api_url: env_string("GAMMA_API_URL", "https://gamma-api.polymarket.com"),

            poll_ms: env_parse("POLL_MS", 60_000),
            fast_poll_secs: env_parse("FAST_POLL_SECS", 60),
            keyword_poll_secs: env_parse("KEYWORD_POLL_SECS", 300),
            complete_poll_cycles: env_parse("COMPLETE_POLL_CYCLES", 60),

            ws_reconnect_backoff_min_ms: env_parse("WS_RECONNECT_BACKOFF_MIN", 1_000),
            ws_reconnect_backoff_max_ms: env_parse("WS_RECONNECT_BACKOFF_MAX", 8_000),
            ws_max_subscriptions: env_parse("WS_MAX_SUBSCRIPTIONS", 3_000),

            webhook_listen_host: env_string("WEBHOOK_LISTEN_HOST", "0.0.0.0"),
            webhook_listen_port: env_parse("WEBHOOK_LISTEN_PORT", 8090),
            redis_bridge_webhook_url: env_string(
                "REDIS_BRIDGE_WEBHOOK_URL",
                "http://127.0.0.1:8090/wh/market",
            ),
            redis_bridge_copy_trade_webhook_url: env_string(
                "REDIS_BRIDGE_COPY_TRADE_WEBHOOK_URL",
                "http://127.0.0.1:8090/wh/copy_trade",
            ),

            tpsl_check_interval_sec: env_parse("TPSL_CHECK_INTERVAL_SEC", 10),
            smart_sync_interval_sec: env_parse("SMART_SYNC_INTERVAL_SEC", 60),

            min_copy_amount_usd: env_parse("MIN_COPY_AMOUNT_USD", 1.0),
            min_allocation_percentage: env_parse("MIN_ALLOCATION_PERCENTAGE", 1.0),
            max_allocation_percentage: env_parse("MAX_ALLOCATION_PERCENTAGE", 100.0),

            watched_markets_interval_sec: env_parse("WATCHED_MARKETS_INTERVAL_SEC", 60),
            position_cache_ttl_sec: env_parse("POSITION_CACHE_TTL_SEC", 180),

            skip_db: env_bool("SKIP_DB", false),
            exchange_data_api_url: env_string(
                "EXCHANGE_DATA_API_URL",
                "http://127.0.0.1:8091",
            ),

            dry_run: env_bool("DRY_RUN", true),

            poly_address: std::env::var("POLY_ADDRESS").ok(),
            poly_api_key: std::env::var("POLYMARKET_API_KEY").ok(),
            poly_api_secret: std::env::var("POLYMARKET_API_SECRET").ok(),
            poly_api_passphrase: std::env::var("POLYMARKET_API_PASSPHRASE").ok(),
            poly_funder_address: std::env::var("POLYMARKET_FUNDER_ADDRESS").ok(),
        })
    }

    pub fn tpsl_interval(&self) -> Duration {
        Duration::from_secs(self.tpsl_check_interval_sec)
    }

    pub fn smart_sync_interval(&self) -> Duration {
        Duration::from_secs(self.smart_sync_interval_sec)
    }

    pub fn watched_markets_interval(&self) -> Duration {
        Duration::from_secs(self.watched_markets_interval_sec)
    }
}
