//! Core library: market store, polling/streaming, the Redis pub/sub bridge,
//! copy-trading, smart-wallet ingestion and TP/SL automation. `main.rs` is
//! the composition root; it wires these together from `Config` and owns
//! the process lifecycle. Everything else lives here so it can also be
//! exercised directly from tests.

pub mod bridge;
pub mod config;
pub mod copy_trading;
pub mod db;
pub mod error;
pub mod exchange;
pub mod ids;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod poller;
pub mod positions;
pub mod publisher;
pub mod smart_wallet;
pub mod store;
pub mod streamer;
pub mod supervisor;
pub mod tpsl;
pub mod watched_markets;
pub mod webhook_api;
