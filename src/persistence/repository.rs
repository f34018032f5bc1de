//! Database Repository
//!
//! Data access layer for canonical trades and sync cursors. The two are
//! written together: a sync run's trade batch and its cursor advance land
//! in one transaction, so no reader can ever observe an advanced cursor
//! without its trades.

use super::models::{SyncCursorRecord, TradeRecord};
use super::{DatabaseError, DbPool};
use chrono::Utc;
use tracing::{debug, error};

use crate::domain::entities::trade::CanonicalTrade;

// SQLite caps bound parameters per statement; stay well under it when
// expanding IN lists.
const IN_CHUNK: usize = 400;

/// Trade repository, including the transactional sync commit.
pub struct TradeRepository {
    pool: DbPool,
}

impl TradeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Commit one sync run: upsert every fetched trade keyed by
    /// `(account_external_id, position_id, coin)` and advance the cursor to
    /// `window_end_ms`, all-or-nothing.
    ///
    /// The upsert overwrites mutable fields with the freshest provider data,
    /// so a position partially closed earlier and fully closed now is
    /// superseded in place. The cursor advance uses `MAX`, so it can never
    /// move backwards even if runs commit out of order.
    pub async fn commit_sync(
        &self,
        account_external_id: &str,
        coin: &str,
        trades: &[CanonicalTrade],
        window_end_ms: i64,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to open sync transaction: {}", e);
            DatabaseError::QueryError(format!("Failed to open sync transaction: {}", e))
        })?;

        for trade in trades {
            sqlx::query(
                r#"
                INSERT INTO trades (
                    account_external_id, position_id, coin, symbol, position_side,
                    isolated, open_time, update_time, avg_price, avg_close_price,
                    realised_profit, net_profit, position_amt, close_position_amt,
                    leverage, close_all_positions, position_commission, total_funding,
                    instrument, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?20)
                ON CONFLICT(account_external_id, position_id, coin) DO UPDATE SET
                    symbol = excluded.symbol,
                    position_side = excluded.position_side,
                    isolated = excluded.isolated,
                    open_time = excluded.open_time,
                    update_time = excluded.update_time,
                    avg_price = excluded.avg_price,
                    avg_close_price = excluded.avg_close_price,
                    realised_profit = excluded.realised_profit,
                    net_profit = excluded.net_profit,
                    position_amt = excluded.position_amt,
                    close_position_amt = excluded.close_position_amt,
                    leverage = excluded.leverage,
                    close_all_positions = excluded.close_all_positions,
                    position_commission = excluded.position_commission,
                    total_funding = excluded.total_funding,
                    instrument = excluded.instrument,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&trade.account_external_id)
            .bind(&trade.position_id)
            .bind(&trade.coin)
            .bind(&trade.symbol)
            .bind(trade.position_side.as_str())
            .bind(trade.isolated)
            .bind(trade.open_time)
            .bind(trade.update_time)
            .bind(&trade.avg_price)
            .bind(&trade.avg_close_price)
            .bind(&trade.realised_profit)
            .bind(&trade.net_profit)
            .bind(&trade.position_amt)
            .bind(&trade.close_position_amt)
            .bind(trade.leverage)
            .bind(trade.close_all_positions)
            .bind(&trade.position_commission)
            .bind(&trade.total_funding)
            .bind(trade.instrument.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to upsert trade {}: {}", trade.position_id, e);
                DatabaseError::QueryError(format!("Failed to upsert trade: {}", e))
            })?;
        }

        sqlx::query(
            r#"
            INSERT INTO sync_cursors (account_external_id, coin, last_synced_at_ms, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(account_external_id, coin) DO UPDATE SET
                last_synced_at_ms = MAX(last_synced_at_ms, excluded.last_synced_at_ms),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(account_external_id)
        .bind(coin)
        .bind(window_end_ms)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to advance sync cursor: {}", e);
            DatabaseError::QueryError(format!("Failed to advance sync cursor: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit sync transaction: {}", e);
            DatabaseError::QueryError(format!("Failed to commit sync transaction: {}", e))
        })?;

        debug!(
            "Committed {} trades for {}/{}, cursor -> {}",
            trades.len(),
            account_external_id,
            coin,
            window_end_ms
        );
        Ok(())
    }

    /// Trades whose last update falls inside `[start_ms, end_ms]`.
    pub async fn in_range(
        &self,
        account_external_id: &str,
        coin: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TradeRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, TradeRecord>(
            r#"
            SELECT * FROM trades
            WHERE account_external_id = ?1 AND coin = ?2
              AND update_time >= ?3 AND update_time <= ?4
            ORDER BY update_time ASC
            "#,
        )
        .bind(account_external_id)
        .bind(coin)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load trades in range: {}", e);
            DatabaseError::QueryError(format!("Failed to load trades: {}", e))
        })?;

        Ok(records)
    }

    /// Load member trades by position id, chunked to respect SQLite's bound
    /// parameter limit. Used by the rollup to recompute a day from its
    /// membership set without scanning the table.
    pub async fn by_position_ids(
        &self,
        account_external_id: &str,
        coin: &str,
        position_ids: &[String],
    ) -> Result<Vec<TradeRecord>, DatabaseError> {
        let mut records = Vec::with_capacity(position_ids.len());

        for chunk in position_ids.chunks(IN_CHUNK) {
            let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
                "SELECT * FROM trades WHERE account_external_id = ",
            );
            qb.push_bind(account_external_id);
            qb.push(" AND coin = ");
            qb.push_bind(coin);
            qb.push(" AND position_id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            qb.push(")");

            let rows = qb
                .build_query_as::<TradeRecord>()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to load trades by position id: {}", e);
                    DatabaseError::QueryError(format!("Failed to load trades: {}", e))
                })?;
            records.extend(rows);
        }

        Ok(records)
    }

    /// Total stored trades for an account/coin, any close state.
    pub async fn count(
        &self,
        account_external_id: &str,
        coin: &str,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trades WHERE account_external_id = ?1 AND coin = ?2",
        )
        .bind(account_external_id)
        .bind(coin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to count trades: {}", e);
            DatabaseError::QueryError(format!("Failed to count trades: {}", e))
        })?;

        Ok(row.0)
    }
}

/// Sync cursor repository. Reads only — writes happen inside
/// [`TradeRepository::commit_sync`].
pub struct SyncCursorRepository {
    pool: DbPool,
}

impl SyncCursorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        account_external_id: &str,
        coin: &str,
    ) -> Result<Option<SyncCursorRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, SyncCursorRecord>(
            "SELECT * FROM sync_cursors WHERE account_external_id = ?1 AND coin = ?2",
        )
        .bind(account_external_id)
        .bind(coin)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get sync cursor: {}", e);
            DatabaseError::QueryError(format!("Failed to get sync cursor: {}", e))
        })?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::trade::{InstrumentKind, PositionSide};
    use crate::persistence::init_database;

    fn trade(position_id: &str, net_profit: &str, update_time: i64) -> CanonicalTrade {
        CanonicalTrade {
            account_external_id: "acct-1".to_string(),
            position_id: position_id.to_string(),
            coin: "USDT".to_string(),
            symbol: "BTC-USDT".to_string(),
            position_side: PositionSide::Long,
            isolated: false,
            open_time: update_time - 60_000,
            update_time,
            avg_price: "42000".to_string(),
            avg_close_price: "42100".to_string(),
            realised_profit: net_profit.to_string(),
            net_profit: net_profit.to_string(),
            position_amt: "0.1".to_string(),
            close_position_amt: "0.1".to_string(),
            leverage: 10,
            close_all_positions: true,
            position_commission: "-0.1".to_string(),
            total_funding: "0".to_string(),
            instrument: InstrumentKind::Perpetual,
        }
    }

    #[tokio::test]
    async fn test_commit_sync_lands_trades_and_cursor_together() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let trades = TradeRepository::new(pool.clone());
        let cursors = SyncCursorRepository::new(pool);

        trades
            .commit_sync(
                "acct-1",
                "USDT",
                &[trade("p1", "15", 1_000), trade("p2", "-5", 2_000)],
                5_000,
            )
            .await
            .unwrap();

        assert_eq!(trades.count("acct-1", "USDT").await.unwrap(), 2);
        let cursor = cursors.get("acct-1", "USDT").await.unwrap().unwrap();
        assert_eq!(cursor.last_synced_at_ms, 5_000);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let trades = TradeRepository::new(pool);

        let batch = vec![trade("p1", "15", 1_000)];
        trades.commit_sync("acct-1", "USDT", &batch, 2_000).await.unwrap();
        trades.commit_sync("acct-1", "USDT", &batch, 3_000).await.unwrap();

        assert_eq!(trades.count("acct-1", "USDT").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_supersedes_with_freshest_data() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let trades = TradeRepository::new(pool);

        let mut partial = trade("p1", "5", 1_000);
        partial.close_all_positions = false;
        trades
            .commit_sync("acct-1", "USDT", &[partial], 2_000)
            .await
            .unwrap();

        let full = trade("p1", "9", 1_500);
        trades
            .commit_sync("acct-1", "USDT", &[full], 3_000)
            .await
            .unwrap();

        let records = trades.in_range("acct-1", "USDT", 0, 10_000).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].net_profit, "9");
        assert!(records[0].close_all_positions);
        assert_eq!(records[0].update_time, 1_500);
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backwards() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let trades = TradeRepository::new(pool.clone());
        let cursors = SyncCursorRepository::new(pool);

        trades.commit_sync("acct-1", "USDT", &[], 5_000).await.unwrap();
        trades.commit_sync("acct-1", "USDT", &[], 4_000).await.unwrap();

        let cursor = cursors.get("acct-1", "USDT").await.unwrap().unwrap();
        assert_eq!(cursor.last_synced_at_ms, 5_000);
    }

    #[tokio::test]
    async fn test_by_position_ids_scoped_to_account() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let trades = TradeRepository::new(pool);

        trades
            .commit_sync(
                "acct-1",
                "USDT",
                &[trade("p1", "15", 1_000), trade("p2", "-5", 2_000)],
                5_000,
            )
            .await
            .unwrap();

        let found = trades
            .by_position_ids("acct-1", "USDT", &["p1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].position_id, "p1");

        let other_account = trades
            .by_position_ids("acct-2", "USDT", &["p1".to_string()])
            .await
            .unwrap();
        assert!(other_account.is_empty());
    }

    #[tokio::test]
    async fn test_missing_cursor_is_none() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let cursors = SyncCursorRepository::new(pool);
        assert!(cursors.get("acct-1", "USDT").await.unwrap().is_none());
    }
}
