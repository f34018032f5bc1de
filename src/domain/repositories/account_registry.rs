//! Account Registry Trait
//!
//! Maps an opaque account reference onto the provider-side identity the
//! engine needs. The surrounding application owns account CRUD; the engine
//! only consumes this interface.

use async_trait::async_trait;

use crate::domain::entities::provider::Provider;
use crate::domain::errors::SyncError;

/// Everything the engine needs to know about one journal account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Opaque reference the caller used.
    pub account_ref: String,
    /// The provider's identifier for the account; part of every trade key.
    pub external_id: String,
    pub provider: Provider,
    /// Day-boundary offset for rollups, minutes east of UTC.
    pub utc_offset_minutes: i32,
}

/// Resolves account references for the sync entry point.
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    /// Unknown references and unknown provider names are configuration
    /// errors surfaced as [`SyncError`], never a runtime fallback.
    async fn resolve(&self, account_ref: &str) -> Result<AccountInfo, SyncError>;
}
