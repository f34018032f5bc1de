//! Journal Service
//!
//! The caller-facing surface of the engine: the idempotent sync entry
//! point and the read-only statistics queries. Everything the web layer
//! touches goes through this type.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::domain::entities::day_log::DayLog;
use crate::domain::entities::sync::SyncOutcome;
use crate::domain::entities::trade::{CanonicalTrade, OpenPosition};
use crate::domain::errors::SyncError;
use crate::domain::repositories::account_registry::AccountRegistry;
use crate::domain::services::statistics::{
    self, DailyStatistics, Statistics, SymbolStatistics,
};
use crate::domain::services::sync_lock::SyncLockRegistry;
use crate::application::sync::orchestrator::SyncOrchestrator;
use crate::infrastructure::provider_client_factory::ProviderClientBuilder;
use crate::persistence::day_log_repository::DayLogRepository;
use crate::persistence::repository::TradeRepository;
use crate::persistence::DbPool;
use crate::secrets::CredentialResolver;

pub struct JournalService {
    pool: DbPool,
    config: SyncConfig,
    accounts: Arc<dyn AccountRegistry>,
    credentials: Arc<dyn CredentialResolver>,
    clients: Arc<dyn ProviderClientBuilder>,
    locks: SyncLockRegistry,
}

impl JournalService {
    pub fn new(
        pool: DbPool,
        config: SyncConfig,
        accounts: Arc<dyn AccountRegistry>,
        credentials: Arc<dyn CredentialResolver>,
        clients: Arc<dyn ProviderClientBuilder>,
    ) -> Self {
        Self {
            pool,
            config,
            accounts,
            credentials,
            clients,
            locks: SyncLockRegistry::new(),
        }
    }

    /// Pull the account's closed-position history since the last sync and
    /// fold it into the journal. Safe to call repeatedly; returns
    /// `synced: false` when there was nothing new.
    ///
    /// Runs for the same `(account, coin)` are serialized: a second call
    /// while one is in flight fails fast with [`SyncError::SyncInProgress`].
    pub async fn sync_account(
        &self,
        account_ref: &str,
        coin: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let account = self.accounts.resolve(account_ref).await?;

        let _guard = self
            .locks
            .try_acquire(&account.external_id, coin)
            .ok_or_else(|| SyncError::SyncInProgress {
                account: account.account_ref.clone(),
                coin: coin.to_string(),
            })?;

        let credentials = self.credentials.resolve(&account).await?;
        let client = self.clients.build(&account, credentials);

        info!("Starting sync for {}/{}", account_ref, coin);
        let result = SyncOrchestrator::new(client, self.pool.clone(), &self.config)
            .run(&account, coin)
            .await;

        if let Err(e) = &result {
            warn!("Sync for {}/{} failed: {}", account_ref, coin, e);
        }
        result
    }

    /// Aggregate statistics over `[start_ms, end_ms]`.
    pub async fn statistics(
        &self,
        account_ref: &str,
        coin: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Statistics, SyncError> {
        let trades = self.trades_in_range(account_ref, coin, start_ms, end_ms).await?;
        Ok(statistics::compute(&trades))
    }

    /// Per-day statistics series over `[start_ms, end_ms]`.
    pub async fn statistics_by_day(
        &self,
        account_ref: &str,
        coin: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<DailyStatistics>, SyncError> {
        let account = self.accounts.resolve(account_ref).await?;
        let trades = self.trades_in_range(account_ref, coin, start_ms, end_ms).await?;
        Ok(statistics::compute_by_day(&trades, account.utc_offset_minutes))
    }

    /// Per-symbol statistics over `[start_ms, end_ms]`.
    pub async fn statistics_by_symbol(
        &self,
        account_ref: &str,
        coin: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<SymbolStatistics>, SyncError> {
        let trades = self.trades_in_range(account_ref, coin, start_ms, end_ms).await?;
        Ok(statistics::compute_by_symbol(&trades))
    }

    /// Stored day logs for a calendar range.
    pub async fn day_logs(
        &self,
        account_ref: &str,
        coin: &str,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<Vec<DayLog>, SyncError> {
        let account = self.accounts.resolve(account_ref).await?;
        let records = DayLogRepository::new(self.pool.clone())
            .list_range(&account.external_id, coin, from, to)
            .await?;
        Ok(records.into_iter().map(|r| r.into_day_log()).collect())
    }

    /// Live open positions straight from the provider, for display only.
    pub async fn open_positions(
        &self,
        account_ref: &str,
        coin: &str,
    ) -> Result<Vec<OpenPosition>, SyncError> {
        let account = self.accounts.resolve(account_ref).await?;
        let credentials = self.credentials.resolve(&account).await?;
        let client = self.clients.build(&account, credentials);

        client.list_open_positions(coin).await.map_err(|e| {
            if e.is_credential() {
                SyncError::InvalidCredentials {
                    account: account.account_ref.clone(),
                    reason: e.to_string(),
                }
            } else {
                SyncError::ProviderUnavailable(e)
            }
        })
    }

    async fn trades_in_range(
        &self,
        account_ref: &str,
        coin: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<CanonicalTrade>, SyncError> {
        let account = self.accounts.resolve(account_ref).await?;
        let records = TradeRepository::new(self.pool.clone())
            .in_range(&account.external_id, coin, start_ms, end_ms)
            .await?;
        Ok(records.into_iter().map(|r| r.into_canonical()).collect())
    }
}
