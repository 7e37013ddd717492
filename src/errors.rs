//! Error kinds the worker state machine needs to branch on (S1-S8 in the
//! design doc). Everything else in the crate uses `anyhow` like the rest
//! of this codebase; this enum exists only where a caller must match on
//! *kind* rather than just log-and-propagate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transient upstream error: {0}")]
    Transient(String),

    #[error("rate limited")]
    RateLimited,

    #[error("resource not found")]
    NotFound,

    #[error("store conflict on rev: {0}")]
    Conflict(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cryptographic failure: {0}")]
    Crypto(String),
}

impl BridgeError {
    /// S4/S7: classify an upstream HTTP response by status code.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        if status == reqwest::StatusCode::NOT_FOUND {
            BridgeError::NotFound
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            BridgeError::RateLimited
        } else if status.is_server_error() {
            BridgeError::Transient(format!("upstream returned {status}"))
        } else {
            BridgeError::Transient(format!("request failed with {status}"))
        }
    }

    /// Whether S1-S8 should push the item back onto the retry queue.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BridgeError::NotFound | BridgeError::Config(_))
    }

    /// §4.6: 429s don't count toward `retries_count` or double `timeout`.
    pub fn counts_toward_retries(&self) -> bool {
        !matches!(self, BridgeError::RateLimited)
    }
}
