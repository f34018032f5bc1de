pub mod bingx_client;
pub mod bitunix_client;
pub mod env_account_registry;
pub mod provider_client_factory;

use once_cell::sync::Lazy;
use std::time::Duration;

// Per-call timeout keeps one slow endpoint from stalling a whole batch;
// timeouts surface as transport errors and degrade to empty results.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
});

/// Shared HTTP client for all provider adapters.
pub(crate) fn http_client() -> reqwest::Client {
    HTTP_CLIENT.clone()
}
