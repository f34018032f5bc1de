//! Persistence Layer
//!
//! SQLite storage for canonical trades, sync cursors, and day logs, with
//! async access via sqlx. Migrations run inline at startup.
//!
//! # Database Schema
//!
//! ## Trades Table
//! One row per closed/partially-closed position, keyed by
//! `(account_external_id, position_id, coin)` — the idempotency key for
//! upsert. Monetary columns are TEXT holding exact decimal strings.
//!
//! ## Sync Cursors Table
//! One row per `(account_external_id, coin)` carrying `last_synced_at_ms`.
//! Advanced only inside the same transaction as the trade batch it unlocks,
//! and never backwards.
//!
//! ## Day Logs Table
//! One row per `(account_external_id, log_date, coin)` with derived daily
//! metrics and the member position-id set as a JSON array.

pub mod day_log_repository;
pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

/// Initialize the database connection pool
///
/// # Arguments
/// - `database_url`: Path to SQLite database file (e.g., "sqlite://data/traderlog.db")
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            account_external_id TEXT NOT NULL,
            position_id TEXT NOT NULL,
            coin TEXT NOT NULL,
            symbol TEXT NOT NULL,
            position_side TEXT NOT NULL CHECK(position_side IN ('LONG', 'SHORT')),
            isolated INTEGER NOT NULL DEFAULT 0,
            open_time INTEGER NOT NULL,
            update_time INTEGER NOT NULL,
            avg_price TEXT NOT NULL,
            avg_close_price TEXT NOT NULL,
            realised_profit TEXT NOT NULL,
            net_profit TEXT NOT NULL,
            position_amt TEXT NOT NULL,
            close_position_amt TEXT NOT NULL,
            leverage INTEGER NOT NULL DEFAULT 1,
            close_all_positions INTEGER NOT NULL DEFAULT 0,
            position_commission TEXT NOT NULL,
            total_funding TEXT NOT NULL,
            instrument TEXT NOT NULL CHECK(instrument IN ('perpetual', 'standard')),
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (account_external_id, position_id, coin)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_cursors (
            account_external_id TEXT NOT NULL,
            coin TEXT NOT NULL,
            last_synced_at_ms INTEGER NOT NULL,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (account_external_id, coin)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create sync_cursors table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS day_logs (
            account_external_id TEXT NOT NULL,
            log_date DATE NOT NULL,
            coin TEXT NOT NULL,
            net_pnl REAL NOT NULL DEFAULT 0,
            total_trades INTEGER NOT NULL DEFAULT 0,
            winners INTEGER NOT NULL DEFAULT 0,
            losers INTEGER NOT NULL DEFAULT 0,
            win_rate REAL NOT NULL DEFAULT 0,
            commissions REAL NOT NULL DEFAULT 0,
            profit_factor REAL NOT NULL DEFAULT 0,
            members TEXT NOT NULL DEFAULT '[]',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (account_external_id, log_date, coin)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create day_logs table: {}", e))
    })?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_trades_account_coin_update_time \
         ON trades(account_external_id, coin, update_time)",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(account_external_id, coin, symbol)",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_day_logs_date \
         ON day_logs(account_external_id, coin, log_date)",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/traderlog.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/traderlog.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/traderlog.db".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Self {
            url,
            max_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init() {
        let pool = init_database("sqlite::memory:").await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = init_database("sqlite::memory:").await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' \
             AND name IN ('trades', 'sync_cursors', 'day_logs')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 3);
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://data/traderlog.db");
        assert_eq!(config.max_connections, 5);
    }
}
