//! Provider Client Factory
//!
//! Builds the adapter matching an account's provider. The `Provider` enum
//! is closed: adding a broker means adding a variant and an arm here,
//! never shape-sniffing at call sites.

use std::sync::Arc;

use crate::domain::entities::provider::Provider;
use crate::domain::repositories::account_registry::AccountInfo;
use crate::domain::repositories::provider_client::ProviderClient;
use crate::infrastructure::bingx_client::BingxClient;
use crate::infrastructure::bitunix_client::BitunixClient;
use crate::secrets::ProviderCredentials;

/// Seam for constructing provider clients, so tests can substitute a
/// scripted client for the real adapters.
pub trait ProviderClientBuilder: Send + Sync {
    fn build(
        &self,
        account: &AccountInfo,
        credentials: ProviderCredentials,
    ) -> Arc<dyn ProviderClient>;
}

pub struct ProviderClientFactory;

impl ProviderClientFactory {
    pub fn create(
        account: &AccountInfo,
        credentials: ProviderCredentials,
    ) -> Arc<dyn ProviderClient> {
        match account.provider {
            Provider::Bingx => Arc::new(BingxClient::new(&account.external_id, credentials)),
            Provider::Bitunix => Arc::new(BitunixClient::new(&account.external_id, credentials)),
        }
    }
}

impl ProviderClientBuilder for ProviderClientFactory {
    fn build(
        &self,
        account: &AccountInfo,
        credentials: ProviderCredentials,
    ) -> Arc<dyn ProviderClient> {
        Self::create(account, credentials)
    }
}
