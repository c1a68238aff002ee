//! Error types for matchday-ai
//!
//! `AnalysisError` is raised by the collaborators (AI service client, match
//! source, document store). Per-item failures are folded into an
//! [`AnalysisFailure`](crate::models::AnalysisFailure) before they are
//! persisted; only configuration errors escape a batch run.

use thiserror::Error;

/// Result alias for matchday-ai operations
pub type AnalysisResultT<T> = std::result::Result<T, AnalysisError>;

/// Errors raised by the analysis pipeline's collaborators
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Network-level failure talking to a remote service
    #[error("Transport error: {detail}")]
    Transport {
        detail: String,
        /// HTTP 429 / quota exhaustion reported by the remote service
        rate_limited: bool,
    },

    /// A call exceeded its configured timeout
    #[error("Request timed out after {0} s")]
    Timeout(u64),

    /// Remote service answered with a non-success status
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Document store or settings table failure
    #[error("Store error: {0}")]
    Store(#[from] matchday_common::Error),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run cancelled by the operator
    #[error("Cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Map a reqwest failure, keeping timeouts distinct
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            return AnalysisError::Timeout(timeout_secs);
        }
        if err.is_decode() {
            return AnalysisError::Decode(err.to_string());
        }
        let rate_limited = err
            .status()
            .map(|s| s == reqwest::StatusCode::TOO_MANY_REQUESTS)
            .unwrap_or(false);
        AnalysisError::Transport {
            detail: err.to_string(),
            rate_limited,
        }
    }

    /// True when retrying later could succeed because of a quota signal
    pub fn is_rate_limited(&self) -> bool {
        match self {
            AnalysisError::Transport { rate_limited, .. } => *rate_limited,
            AnalysisError::Api { status, .. } => *status == 429,
            _ => false,
        }
    }
}
