//! End-to-end tests for the sync and rollup pipeline.
//!
//! Drives the full caller-facing surface — `JournalService::sync_account`
//! plus the statistics queries — against an in-memory SQLite store and a
//! scripted provider, checking the behavior the engine guarantees:
//! idempotent re-sync, cursor monotonicity, day-log dedup, partial-failure
//! tolerance, and the documented aggregation edge cases.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use traderlog::application::services::journal_service::JournalService;
use traderlog::config::SyncConfig;
use traderlog::domain::entities::provider::Provider;
use traderlog::domain::entities::sync::SyncWindow;
use traderlog::domain::entities::trade::{
    CanonicalTrade, InstrumentKind, OpenPosition, PositionSide,
};
use traderlog::domain::errors::SyncError;
use traderlog::domain::repositories::account_registry::{AccountInfo, AccountRegistry};
use traderlog::domain::repositories::provider_client::{
    ProviderClient, ProviderError, ProviderResult,
};
use traderlog::infrastructure::provider_client_factory::ProviderClientBuilder;
use traderlog::persistence::repository::SyncCursorRepository;
use traderlog::persistence::{init_database, DbPool};
use traderlog::secrets::{CredentialResolver, ProviderCredentials};

const ACCOUNT_ID: &str = "uid-1001";

// 2024-01-05 12:00 UTC and 2024-01-06 12:00 UTC.
const JAN5_NOON_MS: i64 = 1_704_456_000_000;
const JAN6_NOON_MS: i64 = 1_704_542_400_000;

fn trade(position_id: &str, symbol: &str, net_profit: &str, close_ms: i64) -> CanonicalTrade {
    CanonicalTrade {
        account_external_id: ACCOUNT_ID.to_string(),
        position_id: position_id.to_string(),
        coin: "USDT".to_string(),
        symbol: symbol.to_string(),
        position_side: PositionSide::Long,
        isolated: false,
        open_time: close_ms - 3_600_000,
        update_time: close_ms,
        avg_price: "42000".to_string(),
        avg_close_price: "42100".to_string(),
        realised_profit: net_profit.to_string(),
        net_profit: net_profit.to_string(),
        position_amt: "0.1".to_string(),
        close_position_amt: "0.1".to_string(),
        leverage: 10,
        close_all_positions: true,
        position_commission: "-0.2".to_string(),
        total_funding: "0".to_string(),
        instrument: InstrumentKind::Perpetual,
    }
}

/// Scripted provider shared by the whole suite.
struct ScriptedProvider {
    trades: Vec<CanonicalTrade>,
    failing_symbols: HashSet<String>,
    reject_credentials: bool,
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn provider(&self) -> Provider {
        Provider::Bingx
    }

    async fn credentials_valid(&self, _coin: &str) -> ProviderResult<bool> {
        Ok(!self.reject_credentials)
    }

    async fn list_filled_order_symbols(
        &self,
        _coin: &str,
        _window: SyncWindow,
    ) -> ProviderResult<BTreeSet<String>> {
        Ok(self.trades.iter().map(|t| t.symbol.clone()).collect())
    }

    async fn fetch_position_history(
        &self,
        symbol: &str,
        _coin: &str,
        _window: SyncWindow,
    ) -> ProviderResult<Vec<CanonicalTrade>> {
        if self.failing_symbols.contains(symbol) {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        Ok(self
            .trades
            .iter()
            .filter(|t| t.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn list_open_positions(&self, _coin: &str) -> ProviderResult<Vec<OpenPosition>> {
        Ok(Vec::new())
    }
}

struct ScriptedBuilder {
    client: Arc<ScriptedProvider>,
}

impl ProviderClientBuilder for ScriptedBuilder {
    fn build(
        &self,
        _account: &AccountInfo,
        _credentials: ProviderCredentials,
    ) -> Arc<dyn ProviderClient> {
        Arc::clone(&self.client) as Arc<dyn ProviderClient>
    }
}

struct StaticRegistry;

#[async_trait]
impl AccountRegistry for StaticRegistry {
    async fn resolve(&self, account_ref: &str) -> Result<AccountInfo, SyncError> {
        if account_ref != "main" {
            return Err(SyncError::UnknownAccount(account_ref.to_string()));
        }
        Ok(AccountInfo {
            account_ref: "main".to_string(),
            external_id: ACCOUNT_ID.to_string(),
            provider: Provider::Bingx,
            utc_offset_minutes: 0,
        })
    }
}

struct StaticResolver;

#[async_trait]
impl CredentialResolver for StaticResolver {
    async fn resolve(&self, _account: &AccountInfo) -> Result<ProviderCredentials, SyncError> {
        Ok(ProviderCredentials::new("test-key", "test-secret"))
    }
}

async fn service_with(provider: ScriptedProvider) -> (JournalService, DbPool) {
    let pool = init_database("sqlite::memory:").await.unwrap();
    let config = SyncConfig {
        first_sync_lookback_days: 30,
        batch_size: 5,
        batch_delay_ms: 0,
    };
    let service = JournalService::new(
        pool.clone(),
        config,
        Arc::new(StaticRegistry),
        Arc::new(StaticResolver),
        Arc::new(ScriptedBuilder {
            client: Arc::new(provider),
        }),
    );
    (service, pool)
}

fn standard_script() -> ScriptedProvider {
    ScriptedProvider {
        trades: vec![
            trade("p-1", "BTC-USDT", "15", JAN5_NOON_MS),
            trade("p-2", "BTC-USDT", "-5", JAN5_NOON_MS + 60_000),
            trade("p-3", "ETH-USDT", "8", JAN6_NOON_MS),
        ],
        failing_symbols: HashSet::new(),
        reject_credentials: false,
    }
}

#[tokio::test]
async fn first_sync_builds_day_logs_and_statistics() {
    let (service, _pool) = service_with(standard_script()).await;

    let outcome = service.sync_account("main", "USDT").await.unwrap();
    assert!(outcome.synced);
    assert_eq!(
        outcome.earliest_trade_date,
        NaiveDate::from_ymd_opt(2024, 1, 5)
    );

    let jan5 = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let jan6 = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
    let logs = service.day_logs("main", "USDT", jan5, jan6).await.unwrap();
    assert_eq!(logs.len(), 2);

    let day5 = &logs[0];
    assert_eq!(day5.date, jan5);
    assert_eq!(day5.total_trades, 2);
    assert_eq!(day5.winners, 1);
    assert_eq!(day5.losers, 1);
    assert_eq!(day5.net_pnl, 10.0);
    assert_eq!(day5.profit_factor, 3.0);
    assert_eq!(day5.win_rate, 50.0);

    let day6 = &logs[1];
    assert_eq!(day6.date, jan6);
    assert_eq!(day6.total_trades, 1);
    assert_eq!(day6.winners, 1);
    assert_eq!(day6.losers, 0);
    assert_eq!(day6.net_pnl, 8.0);
    // No losing trades: profit factor is the winning sum, not infinity.
    assert_eq!(day6.profit_factor, 8.0);

    let stats = service
        .statistics("main", "USDT", 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(stats.net_pnl.value, 18.0);
    assert_eq!(stats.net_pnl.total_trades, 3);
}

#[tokio::test]
async fn resync_with_no_new_data_is_idempotent() {
    let (service, pool) = service_with(standard_script()).await;

    service.sync_account("main", "USDT").await.unwrap();
    let jan5 = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let jan6 = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
    let first_logs = service.day_logs("main", "USDT", jan5, jan6).await.unwrap();
    let first_stats = service.statistics("main", "USDT", 0, i64::MAX).await.unwrap();

    // Provider re-reports the same positions on the second run.
    service.sync_account("main", "USDT").await.unwrap();
    let second_logs = service.day_logs("main", "USDT", jan5, jan6).await.unwrap();
    let second_stats = service.statistics("main", "USDT", 0, i64::MAX).await.unwrap();

    assert_eq!(first_logs, second_logs);
    assert_eq!(first_stats.net_pnl.total_trades, second_stats.net_pnl.total_trades);
    assert_eq!(first_stats.net_pnl.value, second_stats.net_pnl.value);

    // The cursor still advanced: nothing new is not an error.
    let cursor = SyncCursorRepository::new(pool)
        .get(ACCOUNT_ID, "USDT")
        .await
        .unwrap()
        .unwrap();
    assert!(cursor.last_synced_at_ms > 0);
}

#[tokio::test]
async fn cursor_is_monotonic_across_runs() {
    let (service, pool) = service_with(standard_script()).await;
    let cursors = SyncCursorRepository::new(pool);

    let mut last = 0i64;
    for _ in 0..3 {
        let outcome = service.sync_account("main", "USDT").await.unwrap();
        let cursor = cursors
            .get(ACCOUNT_ID, "USDT")
            .await
            .unwrap()
            .unwrap()
            .last_synced_at_ms;
        assert!(cursor >= last);
        assert_eq!(cursor, outcome.sync_time_ms);
        last = cursor;
    }
}

#[tokio::test]
async fn one_failing_symbol_does_not_block_the_others() {
    let mut script = standard_script();
    script.failing_symbols.insert("BTC-USDT".to_string());
    let (service, _pool) = service_with(script).await;

    let outcome = service.sync_account("main", "USDT").await.unwrap();
    assert!(outcome.synced);

    // Only ETH-USDT's trade landed; BTC-USDT degraded to empty.
    let stats = service
        .statistics("main", "USDT", 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(stats.net_pnl.total_trades, 1);
    assert_eq!(stats.net_pnl.value, 8.0);
}

#[tokio::test]
async fn rejected_credentials_surface_distinctly_and_write_nothing() {
    let mut script = standard_script();
    script.reject_credentials = true;
    let (service, pool) = service_with(script).await;

    let err = service.sync_account("main", "USDT").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidCredentials { .. }));
    assert!(!err.is_retryable());

    let cursor = SyncCursorRepository::new(pool)
        .get(ACCOUNT_ID, "USDT")
        .await
        .unwrap();
    assert!(cursor.is_none());

    let stats = service
        .statistics("main", "USDT", 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(stats.net_pnl.total_trades, 0);
}

#[tokio::test]
async fn unknown_account_is_a_configuration_error() {
    let (service, _pool) = service_with(standard_script()).await;
    let err = service.sync_account("ghost", "USDT").await.unwrap_err();
    assert!(matches!(err, SyncError::UnknownAccount(_)));
}

#[tokio::test]
async fn statistics_by_symbol_and_day_split_the_window() {
    let (service, _pool) = service_with(standard_script()).await;
    service.sync_account("main", "USDT").await.unwrap();

    let by_symbol = service
        .statistics_by_symbol("main", "USDT", 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(by_symbol.len(), 2);
    assert_eq!(by_symbol[0].symbol, "BTC-USDT");
    assert_eq!(by_symbol[0].statistics.net_pnl.value, 10.0);
    assert_eq!(by_symbol[0].avg_duration_ms, 3_600_000.0);
    assert_eq!(by_symbol[1].symbol, "ETH-USDT");
    assert_eq!(by_symbol[1].statistics.net_pnl.value, 8.0);

    let by_day = service
        .statistics_by_day("main", "USDT", 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(by_day.len(), 2);
    assert_eq!(by_day[0].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    assert_eq!(by_day[0].statistics.net_pnl.value, 10.0);
    assert_eq!(by_day[1].statistics.net_pnl.value, 8.0);
}

#[tokio::test]
async fn partially_closed_positions_are_stored_but_not_counted() {
    let mut script = standard_script();
    let mut partial = trade("p-open", "BTC-USDT", "100", JAN5_NOON_MS);
    partial.close_all_positions = false;
    script.trades.push(partial);
    let (service, _pool) = service_with(script).await;

    service.sync_account("main", "USDT").await.unwrap();

    let stats = service
        .statistics("main", "USDT", 0, i64::MAX)
        .await
        .unwrap();
    // Counted trades exclude the partial close...
    assert_eq!(stats.net_pnl.total_trades, 3);
    assert_eq!(stats.net_pnl.value, 18.0);

    // ...and so does the day log for the 5th.
    let jan5 = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let logs = service.day_logs("main", "USDT", jan5, jan5).await.unwrap();
    assert_eq!(logs[0].total_trades, 2);
    assert!(!logs[0].members.contains("p-open"));
}

#[tokio::test]
async fn fully_closing_a_previously_partial_position_supersedes_it() {
    // First sync reports the position partially closed.
    let mut partial = trade("p-9", "BTC-USDT", "4", JAN5_NOON_MS);
    partial.close_all_positions = false;
    let (service, pool) = service_with(ScriptedProvider {
        trades: vec![partial],
        failing_symbols: HashSet::new(),
        reject_credentials: false,
    })
    .await;
    service.sync_account("main", "USDT").await.unwrap();

    let stats = service.statistics("main", "USDT", 0, i64::MAX).await.unwrap();
    assert_eq!(stats.net_pnl.total_trades, 0);

    // Second sync re-reports the same position id, now fully closed.
    let config = SyncConfig {
        first_sync_lookback_days: 30,
        batch_size: 5,
        batch_delay_ms: 0,
    };
    let service = JournalService::new(
        pool,
        config,
        Arc::new(StaticRegistry),
        Arc::new(StaticResolver),
        Arc::new(ScriptedBuilder {
            client: Arc::new(ScriptedProvider {
                trades: vec![trade("p-9", "BTC-USDT", "9", JAN5_NOON_MS + 120_000)],
                failing_symbols: HashSet::new(),
                reject_credentials: false,
            }),
        }),
    );
    service.sync_account("main", "USDT").await.unwrap();

    let stats = service.statistics("main", "USDT", 0, i64::MAX).await.unwrap();
    assert_eq!(stats.net_pnl.total_trades, 1);
    assert_eq!(stats.net_pnl.value, 9.0);

    let jan5 = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let logs = service.day_logs("main", "USDT", jan5, jan5).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].total_trades, 1);
    assert_eq!(logs[0].net_pnl, 9.0);
}
