//! Run-level error taxonomy.

use thiserror::Error;

use crate::domain::repositories::provider_client::ProviderError;
use crate::persistence::DatabaseError;

/// Errors a sync run or statistics query can report to the caller.
///
/// Everything below the orchestrator is caught and downgraded to partial
/// results where the failure is scoped to one symbol or record; only the
/// variants here are run-fatal.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Keys rejected by the provider. Surfaced verbatim, never retried.
    #[error("invalid credentials for account {account}: {reason}")]
    InvalidCredentials { account: String, reason: String },

    /// Phase-1 symbol discovery failed; no useful partial work is possible
    /// without it.
    #[error("symbol discovery failed: {0}")]
    Discovery(ProviderError),

    /// A run for the same (account, coin) is already in flight.
    #[error("sync already running for {account}/{coin}")]
    SyncInProgress { account: String, coin: String },

    /// Transaction failure during commit; the cursor did not advance and
    /// the same window is safe to retry.
    #[error("persistence failure: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("unknown provider name: {0}")]
    UnknownProvider(String),

    #[error("unknown account reference: {0}")]
    UnknownAccount(String),

    /// Transient provider failure outside the per-symbol recovery path
    /// (e.g. the credential probe timing out).
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(ProviderError),
}

impl SyncError {
    /// Whether the caller may safely retry the run against the same window.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::InvalidCredentials { .. }
                | SyncError::UnknownProvider(_)
                | SyncError::UnknownAccount(_)
        )
    }
}
