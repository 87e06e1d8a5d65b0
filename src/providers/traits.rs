//! Provider traits and types

use crate::references::{AskDelta, Reference};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Interaction mode a provider is selected for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Search,
    Ask,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// Provider error types
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Backend unreachable or answered with a failure status
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a payload that could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Cancellation was observed; never a user-visible failure
    #[error("operation cancelled")]
    Cancelled,

    /// Provider could not be constructed (index missing, bad options, ...)
    #[error("failed to initialize provider {provider}: {reason}")]
    Init { provider: String, reason: String },

    #[error("no provider available for {0} mode")]
    NoProvider(Mode),

    #[error("provider {provider} does not support {mode} mode")]
    Unsupported { provider: String, mode: Mode },
}

impl ProviderError {
    pub fn init(provider: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Init {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Sender half handed to `ask`; each delta is applied in send order
pub type DeltaSender = mpsc::Sender<AskDelta>;

/// Contract every search or ask backend implements
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Warm backend caches for a query. Failures are logged and ignored by callers.
    async fn before_search(&self, _query: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Search for references.
    ///
    /// `Ok(None)` means the backend has no opinion on the query, while
    /// `Ok(Some(vec![]))` means it searched and found nothing.
    async fn search(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<Option<Vec<Reference>>, ProviderError>;

    /// Whether `ask` is implemented
    fn supports_ask(&self) -> bool {
        false
    }

    /// Stream an answer for `query` as deltas.
    ///
    /// Returning is the terminal signal. Implementations stop sending once
    /// `cancel` fires and return [`ProviderError::Cancelled`].
    async fn ask(
        &self,
        _session_id: u32,
        _query: &str,
        _deltas: DeltaSender,
        _cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.name().to_string(),
            mode: Mode::Ask,
        })
    }
}
