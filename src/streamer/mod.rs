//! Component C: WS Streamer (spec §4.C). State machine `Disconnected →
//! Connecting → Subscribing → Streaming → Disconnected`, reconnect with
//! capped exponential backoff + jitter, fatal after N consecutive failed
//! connects. Follows
//! `scrapers/polymarket_ws.rs::PolymarketMarketWsCache`, generalized from a
//! per-token orderbook cache to the shared `MarketStore` live-quote layer.

pub mod messages;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::{Sink, SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::models::{LiveMarketQuote, QuoteSource};
use crate::store::MarketStore;
use crate::streamer::messages::{parse_frame, WsFrame};

const PING_INTERVAL: Duration = Duration::from_secs(5);
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Desired-subscription signal written by the Watched-Markets Controller
/// (§4.H) and read by the Streamer: `token_id -> market_id`, where
/// `token_id` is the market's primary (YES) outcome token per the
/// `store::live_quote` binary-market convention.
pub type WatchedSet = Arc<ArcSwap<HashMap<String, String>>>;

pub fn new_watched_set() -> WatchedSet {
    Arc::new(ArcSwap::from_pointee(HashMap::new()))
}

enum WsCommand {
    RefreshSubscriptions,
}

pub struct WsStreamer {
    url: String,
    store: Arc<MarketStore>,
    watched: WatchedSet,
    max_subscriptions: usize,
    cmd_tx: mpsc::Sender<WsCommand>,
    cmd_rx: tokio::sync::Mutex<Option<mpsc::Receiver<WsCommand>>>,
}

impl WsStreamer {
    pub fn new(cfg: &Config, store: Arc<MarketStore>, watched: WatchedSet) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        Self {
            url: cfg.clob_wss_url.clone(),
            store,
            watched,
            max_subscriptions: cfg.ws_max_subscriptions,
            cmd_tx,
            cmd_rx: tokio::sync::Mutex::new(Some(cmd_rx)),
        }
    }

    /// Nudges the streamer to re-read the watched set on its next idle
    /// tick. Called by the Watched-Markets Controller after it updates
    /// `watched`. Non-blocking; a missed nudge self-heals on reconnect.
    pub fn request_refresh(&self) {
        let _ = self.cmd_tx.try_send(WsCommand::RefreshSubscriptions);
    }

    pub async fn run(&self) -> CoreResult<()> {
        let mut cmd_rx = self
            .cmd_rx
            .lock()
            .await
            .take()
            .expect("WsStreamer::run called more than once");

        let mut consecutive_failures: u32 = 0;
        let min_backoff = Duration::from_secs(1);
        let max_backoff = Duration::from_secs(8);
        let mut backoff = min_backoff;

        loop {
            match self.connect_and_stream(&mut cmd_rx).await {
                Ok(()) => {
                    consecutive_failures = 0;
                    backoff = min_backoff;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(error = %e, consecutive_failures, "ws streamer disconnected");
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(CoreError::Fatal(format!(
                            "ws streamer failed {consecutive_failures} consecutive connects: {e}"
                        )));
                    }
                    let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..0.10);
                    let jittered = backoff.mul_f64(1.0 + jitter_frac);
                    sleep(jittered).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    }

    async fn connect_and_stream(&self, cmd_rx: &mut mpsc::Receiver<WsCommand>) -> CoreResult<()> {
        info!(url = %self.url, "connecting to CLOB market ws");
        let (ws_stream, resp) = connect_async(&self.url)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("ws connect: {e}")))?;
        info!(status = %resp.status(), "ws connected");

        let (mut write, mut read) = ws_stream.split();
        let mut subscribed: HashSet<String> = HashSet::new();

        subscribe_additions(&mut write, &self.watched, &mut subscribed, self.max_subscriptions).await?;

        let mut ping = interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    let _ = write.send(Message::Text("PING".to_string())).await;
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(WsCommand::RefreshSubscriptions) | None => {
                            subscribe_additions(&mut write, &self.watched, &mut subscribed, self.max_subscriptions).await?;
                        }
                    }
                }
                msg = read.next() => {
                    let Some(msg) = msg else {
                        return Err(CoreError::Transient("ws stream ended".into()));
                    };
                    match msg {
                        Ok(Message::Text(text)) => self.handle_frame(&text),
                        Ok(Message::Ping(payload)) => { let _ = write.send(Message::Pong(payload)).await; }
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "ws close frame");
                            return Err(CoreError::Transient("ws closed by peer".into()));
                        }
                        Ok(_) => {}
                        Err(e) => return Err(CoreError::Transient(format!("ws read error: {e}"))),
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match parse_frame(text) {
            WsFrame::Snapshot(f) => {
                if let Some(market_id) = self.market_for_token(&f.asset_id) {
                    let best_bid = best_price(&f.bids, true);
                    let best_ask = best_price(&f.asks, false);
                    self.store.set_live_quote(
                        &market_id,
                        LiveMarketQuote::new(QuoteSource::Ws, best_bid, best_ask),
                    );
                }
            }
            WsFrame::Delta(f) => {
                if let Some(market_id) = self.market_for_token(&f.asset_id) {
                    let prior = self.store.get_live_quote(&market_id);
                    let best_bid = if f.bids.is_empty() {
                        prior.as_ref().and_then(|q| q.best_bid)
                    } else {
                        best_price(&f.bids, true)
                    };
                    let best_ask = if f.asks.is_empty() {
                        prior.as_ref().and_then(|q| q.best_ask)
                    } else {
                        best_price(&f.asks, false)
                    };
                    self.store.set_live_quote(
                        &market_id,
                        LiveMarketQuote::new(QuoteSource::Ws, best_bid, best_ask),
                    );
                }
            }
            WsFrame::Trade(f) => {
                if let Some(market_id) = self.market_for_token(&f.asset_id) {
                    if let Some(prior) = self.store.get_live_quote(&market_id) {
                        let mut next = *prior;
                        next.last_trade_price = Some(f.price);
                        next.updated_at = chrono::Utc::now();
                        self.store.set_live_quote(&market_id, next);
                    }
                }
            }
            WsFrame::Unrecognized => {}
        }
    }

    fn market_for_token(&self, token_id: &str) -> Option<String> {
        self.watched.load().get(token_id).cloned()
    }
}

fn best_price(levels: &[messages::PriceLevel], want_max: bool) -> Option<f64> {
    levels
        .iter()
        .map(|l| l.price)
        .fold(None, |acc, p| match acc {
            None => Some(p),
            Some(a) if want_max => Some(a.max(p)),
            Some(a) => Some(a.min(p)),
        })
}

async fn subscribe_additions(
    write: &mut (impl Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    watched: &WatchedSet,
    subscribed: &mut HashSet<String>,
    max_subscriptions: usize,
) -> CoreResult<()> {
    let desired = watched.load();
    let additions: Vec<String> = desired
        .keys()
        .filter(|t| !subscribed.contains(*t))
        .take(max_subscriptions.saturating_sub(subscribed.len()))
        .cloned()
        .collect();

    if additions.is_empty() {
        return Ok(());
    }

    let msg = serde_json::json!({
        "type": "market",
        "assets_ids": additions,
    });
    write
        .send(Message::Text(msg.to_string()))
        .await
        .map_err(|e| CoreError::UpstreamUnavailable(format!("ws subscribe send: {e}")))?;

    for token in additions {
        subscribed.insert(token);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::messages::PriceLevel;
    use super::*;

    #[test]
    fn best_price_picks_max_for_bids() {
        let levels = vec![
            PriceLevel { price: 0.40, size: 10.0 },
            PriceLevel { price: 0.45, size: 5.0 },
        ];
        assert_eq!(best_price(&levels, true), Some(0.45));
    }

    #[test]
    fn best_price_picks_min_for_asks() {
        let levels = vec![
            PriceLevel { price: 0.55, size: 10.0 },
            PriceLevel { price: 0.52, size: 5.0 },
        ];
        assert_eq!(best_price(&levels, false), Some(0.52));
    }
}
