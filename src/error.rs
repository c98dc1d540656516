//! Typed error taxonomy (spec §7).
//!
//! Component internals still use `anyhow::Context` for leaf-level library
//! calls; component *boundaries* (supervisor, webhook handlers, execution
//! adapters) return `CoreError` so callers can match on kind instead of
//! string-sniffing an `anyhow::Error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// REST/WS/Redis connectivity failure or 5xx. Recoverable locally with backoff.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// 429 or equivalent. Recover with a longer, capped backoff window.
    #[error("upstream throttled: {0}")]
    UpstreamThrottled(String),

    /// Malformed upstream payload. Skip the item, log, continue.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Domain invariant violated (e.g. missing tx_id). Route to dead-letter.
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("insufficient tokens: need {needed}, have {available}")]
    InsufficientTokens { needed: f64, available: f64 },

    /// Market no longer tradable. Cancel pending triggers and notify.
    #[error("market closed: {0}")]
    MarketClosed(String),

    #[error("market resolved: {0}")]
    MarketResolved(String),

    /// Missing market/position/allocation. No retry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Generic retryable condition (timeouts, connection resets).
    #[error("transient error: {0}")]
    Transient(String),

    /// Irrecoverable; surface to the supervisor for a cooldown restart.
    #[error("fatal error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether this error should propagate to the supervisor for a task restart.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Fatal(_))
    }

    /// Whether the caller may retry automatically (vs. surfacing to a user).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::UpstreamUnavailable(_)
                | CoreError::UpstreamThrottled(_)
                | CoreError::Transient(_)
        )
    }

    /// Whether a trade-execution error must always be surfaced to the
    /// triggering user (spec §7 "Propagation policy").
    pub fn is_user_visible_trade_error(&self) -> bool {
        matches!(
            self,
            CoreError::InsufficientFunds { .. }
                | CoreError::InsufficientTokens { .. }
                | CoreError::MarketClosed(_)
                | CoreError::MarketResolved(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            CoreError::UpstreamUnavailable(e.to_string())
        } else {
            CoreError::Transient(e.to_string())
        }
    }
}
