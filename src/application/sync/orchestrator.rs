//! Sync Orchestrator
//!
//! Drives one synchronization run end to end: credential gate, window
//! computation from the stored cursor, the two-phase history fetch, the
//! all-or-nothing commit of trades plus cursor, and the day-log rollup over
//! the trades just written.
//!
//! All network I/O completes and is held in memory before the first
//! database write — a transaction is never held open across a provider
//! call of unbounded latency. A run that fails before the commit leaves
//! every store untouched, so retrying re-fetches the same window and the
//! keyed upsert makes the replay harmless.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::domain::entities::sync::{SyncOutcome, SyncWindow};
use crate::domain::errors::SyncError;
use crate::domain::repositories::account_registry::AccountInfo;
use crate::domain::repositories::provider_client::ProviderClient;
use crate::application::sync::history_fetcher::{BatchPolicy, HistoryFetcher};
use crate::application::sync::rollup::RollupEngine;
use crate::persistence::repository::{SyncCursorRepository, TradeRepository};
use crate::persistence::DbPool;

const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

pub struct SyncOrchestrator {
    client: Arc<dyn ProviderClient>,
    fetcher: HistoryFetcher,
    trades: TradeRepository,
    cursors: SyncCursorRepository,
    rollup: RollupEngine,
    first_sync_lookback_days: i64,
}

impl SyncOrchestrator {
    pub fn new(client: Arc<dyn ProviderClient>, pool: DbPool, config: &SyncConfig) -> Self {
        Self {
            fetcher: HistoryFetcher::new(Arc::clone(&client), BatchPolicy::from(config)),
            client,
            trades: TradeRepository::new(pool.clone()),
            cursors: SyncCursorRepository::new(pool.clone()),
            rollup: RollupEngine::new(pool),
            first_sync_lookback_days: config.first_sync_lookback_days,
        }
    }

    /// Execute one run for `(account, coin)`.
    ///
    /// The caller is responsible for serializing runs on the same key (see
    /// `JournalService`); this type assumes it holds the run slot.
    pub async fn run(&self, account: &AccountInfo, coin: &str) -> Result<SyncOutcome, SyncError> {
        // Credential gate before any history work. Key rejection is the one
        // error class that must reach the user instead of being retried.
        match self.client.credentials_valid(coin).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(SyncError::InvalidCredentials {
                    account: account.account_ref.clone(),
                    reason: format!("{} rejected the API key", account.provider),
                })
            }
            Err(e) if e.is_credential() => {
                return Err(SyncError::InvalidCredentials {
                    account: account.account_ref.clone(),
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(SyncError::ProviderUnavailable(e)),
        }

        let window = self.compute_window(account, coin).await?;
        debug!(
            "Sync window for {}/{}: [{}, {}]",
            account.external_id, coin, window.start_ms, window.end_ms
        );

        // Phases 1 and 2. Errors surfacing here are discovery failures;
        // per-symbol failures were already degraded to empty results.
        let trades = self
            .fetcher
            .fetch_window(coin, window)
            .await
            .map_err(|e| {
                if e.is_credential() {
                    SyncError::InvalidCredentials {
                        account: account.account_ref.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    SyncError::Discovery(e)
                }
            })?;

        // Commit: cursor and trade batch land in one transaction. An empty
        // window still advances the cursor — nothing to sync is not an
        // error.
        self.trades
            .commit_sync(&account.external_id, coin, &trades, window.end_ms)
            .await?;

        self.rollup
            .apply(&account.external_id, coin, account.utc_offset_minutes, &trades)
            .await?;

        let earliest_trade_date = trades
            .iter()
            .filter(|t| t.is_counted())
            .map(|t| t.close_date(account.utc_offset_minutes))
            .min();

        info!(
            "Synced {}/{}: {} trades, cursor -> {}",
            account.external_id,
            coin,
            trades.len(),
            window.end_ms
        );

        Ok(SyncOutcome {
            synced: !trades.is_empty(),
            sync_time_ms: window.end_ms,
            earliest_trade_date,
        })
    }

    /// Window start is the stored cursor, or the configured lookback on an
    /// account's first sync; the end is always now.
    async fn compute_window(
        &self,
        account: &AccountInfo,
        coin: &str,
    ) -> Result<SyncWindow, SyncError> {
        let now_ms = Utc::now().timestamp_millis();
        let start_ms = match self.cursors.get(&account.external_id, coin).await? {
            Some(cursor) => cursor.last_synced_at_ms,
            None => now_ms - self.first_sync_lookback_days * DAY_MS,
        };
        Ok(SyncWindow::new(start_ms, now_ms))
    }
}
