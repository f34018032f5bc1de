//! Secure credential handling
//!
//! The surrounding application owns credential storage and decryption; the
//! engine only consumes decrypted keys through [`CredentialResolver`].
//! Secrets are carried as `Zeroizing` strings so they are wiped from memory
//! when dropped, and they are never logged.

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::domain::errors::SyncError;
use crate::domain::repositories::account_registry::AccountInfo;

/// Decrypted API credentials for one provider account.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub api_key: Zeroizing<String>,
    pub api_secret: Zeroizing<String>,
}

impl ProviderCredentials {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: Zeroizing::new(api_key.to_string()),
            api_secret: Zeroizing::new(api_secret.to_string()),
        }
    }
}

impl std::fmt::Debug for ProviderCredentials {
    // Never expose key material, even in debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Resolves decrypted credentials for an account.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, account: &AccountInfo) -> Result<ProviderCredentials, SyncError>;
}

/// Environment-backed resolver: `BINGX_API_KEY` / `BINGX_API_SECRET` and
/// the Bitunix equivalents. Suitable for single-operator deployments; a
/// multi-tenant host supplies its own resolver.
pub struct EnvCredentialResolver;

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve(&self, account: &AccountInfo) -> Result<ProviderCredentials, SyncError> {
        let prefix = account.provider.name().to_uppercase();
        let key_var = format!("{}_API_KEY", prefix);
        let secret_var = format!("{}_API_SECRET", prefix);

        let api_key = std::env::var(&key_var).map_err(|_| SyncError::InvalidCredentials {
            account: account.account_ref.clone(),
            reason: format!("{} not set", key_var),
        })?;
        let api_secret = std::env::var(&secret_var).map_err(|_| SyncError::InvalidCredentials {
            account: account.account_ref.clone(),
            reason: format!("{} not set", secret_var),
        })?;

        Ok(ProviderCredentials::new(&api_key, &api_secret))
    }
}
