//! Provider Client Trait
//!
//! Common interface over heterogeneous brokerage history APIs. Each adapter
//! owns its request signing and host selection; callers only ever see
//! canonical shapes. This is what lets the sync pipeline treat BingX and
//! Bitunix identically and lets tests substitute a scripted client.

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::entities::provider::Provider;
use crate::domain::entities::sync::SyncWindow;
use crate::domain::entities::trade::{CanonicalTrade, OpenPosition};

/// Common result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors a provider call can surface.
///
/// The split matters to the orchestrator: `CredentialsRejected` aborts the
/// run immediately and is never retried, while `Transport`/`Api` failures
/// are transient and degrade to empty results when scoped to one symbol.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} rejected credentials: {message}")]
    CredentialsRejected {
        provider: &'static str,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{provider} api error {code}: {message}")]
    Api {
        provider: &'static str,
        code: i64,
        message: String,
    },

    #[error("malformed {provider} payload: {message}")]
    DataShape {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// True for key-rejection errors, the one class the orchestrator must
    /// surface to the user instead of retrying.
    pub fn is_credential(&self) -> bool {
        matches!(self, ProviderError::CredentialsRejected { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transport(e.to_string())
    }
}

/// Per-broker adapter translating raw exchange responses into canonical
/// shapes.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Which provider this client talks to.
    fn provider(&self) -> Provider;

    /// Cheap authenticated probe. `Ok(false)` and `CredentialsRejected`
    /// both mean the key is unusable; transport failures mean unknown.
    async fn credentials_valid(&self, coin: &str) -> ProviderResult<bool>;

    /// Phase-1 discovery: the unique set of symbols with any execution
    /// activity inside the window.
    async fn list_filled_order_symbols(
        &self,
        coin: &str,
        window: SyncWindow,
    ) -> ProviderResult<BTreeSet<String>>;

    /// Phase-2 fetch: full position history for one symbol inside the
    /// window. Records that fail normalization are dropped by the adapter
    /// with a warning, never surfaced as errors.
    async fn fetch_position_history(
        &self,
        symbol: &str,
        coin: &str,
        window: SyncWindow,
    ) -> ProviderResult<Vec<CanonicalTrade>>;

    /// Currently open positions, for reporting only.
    async fn list_open_positions(&self, coin: &str) -> ProviderResult<Vec<OpenPosition>>;
}
