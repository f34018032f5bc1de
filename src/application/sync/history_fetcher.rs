//! History Fetcher
//!
//! Two-phase fetch against one provider. Phase 1 discovers the symbols the
//! account actually touched in the window, so we never request full history
//! for the provider's whole symbol universe. Phase 2 fetches per-symbol
//! history in fixed-size concurrent batches with a pause between batches —
//! the pipeline's only backoff mechanism.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::domain::entities::sync::SyncWindow;
use crate::domain::entities::trade::CanonicalTrade;
use crate::domain::repositories::provider_client::{ProviderClient, ProviderResult};

/// Batching and backoff knobs, injected so tests can collapse the delay
/// and production can tune it per provider.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_secs(1),
        }
    }
}

impl From<&SyncConfig> for BatchPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        }
    }
}

pub struct HistoryFetcher {
    client: Arc<dyn ProviderClient>,
    policy: BatchPolicy,
}

impl HistoryFetcher {
    pub fn new(client: Arc<dyn ProviderClient>, policy: BatchPolicy) -> Self {
        Self { client, policy }
    }

    /// Fetch every trade the account closed inside the window.
    ///
    /// Errors returned here are phase-1 (discovery) failures and abort the
    /// run: without the symbol set there is no safe partial substitute.
    /// Phase-2 failures never escape — a symbol whose history fetch fails
    /// contributes zero trades so one unreachable endpoint cannot block
    /// ingestion of the others.
    pub async fn fetch_window(
        &self,
        coin: &str,
        window: SyncWindow,
    ) -> ProviderResult<Vec<CanonicalTrade>> {
        let symbols = self.client.list_filled_order_symbols(coin, window).await?;
        info!(
            "Discovered {} active symbols on {} in window [{}, {}]",
            symbols.len(),
            self.client.provider(),
            window.start_ms,
            window.end_ms
        );

        let symbols: Vec<String> = symbols.into_iter().collect();
        let batch_size = self.policy.batch_size.max(1);
        let mut trades = Vec::new();

        for (index, batch) in symbols.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.policy.batch_delay).await;
            }
            debug!("Fetching history batch {} ({} symbols)", index + 1, batch.len());

            let fetches = batch
                .iter()
                .map(|symbol| self.fetch_symbol(symbol, coin, window));
            for batch_trades in join_all(fetches).await {
                trades.extend(batch_trades);
            }
        }

        Ok(trades)
    }

    /// One symbol's history; failures degrade to an empty result.
    async fn fetch_symbol(
        &self,
        symbol: &str,
        coin: &str,
        window: SyncWindow,
    ) -> Vec<CanonicalTrade> {
        match self.client.fetch_position_history(symbol, coin, window).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!(
                    "History fetch for {} failed, treating as empty: {}",
                    symbol, e
                );
                Vec::new()
            }
        }
    }
}
