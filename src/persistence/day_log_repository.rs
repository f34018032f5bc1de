//! Day Log Repository
//!
//! Access layer for the per-day rollup rows. Writes are bulk upserts keyed
//! by `(account_external_id, log_date, coin)`; rows are mutated in place as
//! new trades close on a date and are never deleted.

use chrono::{NaiveDate, Utc};
use tracing::{debug, error};

use super::models::DayLogRecord;
use super::{DatabaseError, DbPool};
use crate::domain::entities::day_log::DayLog;

pub struct DayLogRepository {
    pool: DbPool,
}

impl DayLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        account_external_id: &str,
        coin: &str,
        date: NaiveDate,
    ) -> Result<Option<DayLogRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, DayLogRecord>(
            "SELECT * FROM day_logs \
             WHERE account_external_id = ?1 AND coin = ?2 AND log_date = ?3",
        )
        .bind(account_external_id)
        .bind(coin)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get day log for {}: {}", date, e);
            DatabaseError::QueryError(format!("Failed to get day log: {}", e))
        })?;

        Ok(record)
    }

    /// Write every affected day in one transaction.
    pub async fn upsert_all(&self, logs: &[DayLog]) -> Result<(), DatabaseError> {
        if logs.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to open day log transaction: {}", e);
            DatabaseError::QueryError(format!("Failed to open day log transaction: {}", e))
        })?;

        for log in logs {
            let members = serde_json::to_string(&log.members).map_err(|e| {
                DatabaseError::QueryError(format!("Failed to serialize members: {}", e))
            })?;

            sqlx::query(
                r#"
                INSERT INTO day_logs (
                    account_external_id, log_date, coin, net_pnl, total_trades,
                    winners, losers, win_rate, commissions, profit_factor,
                    members, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                ON CONFLICT(account_external_id, log_date, coin) DO UPDATE SET
                    net_pnl = excluded.net_pnl,
                    total_trades = excluded.total_trades,
                    winners = excluded.winners,
                    losers = excluded.losers,
                    win_rate = excluded.win_rate,
                    commissions = excluded.commissions,
                    profit_factor = excluded.profit_factor,
                    members = excluded.members,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&log.account_external_id)
            .bind(log.date)
            .bind(&log.coin)
            .bind(log.net_pnl)
            .bind(log.total_trades)
            .bind(log.winners)
            .bind(log.losers)
            .bind(log.win_rate)
            .bind(log.commissions)
            .bind(log.profit_factor)
            .bind(&members)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to upsert day log for {}: {}", log.date, e);
                DatabaseError::QueryError(format!("Failed to upsert day log: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit day log transaction: {}", e);
            DatabaseError::QueryError(format!("Failed to commit day logs: {}", e))
        })?;

        debug!("Upserted {} day logs", logs.len());
        Ok(())
    }

    /// Day logs inside `[from, to]`, oldest first. Feeds calendar views.
    pub async fn list_range(
        &self,
        account_external_id: &str,
        coin: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayLogRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, DayLogRecord>(
            "SELECT * FROM day_logs \
             WHERE account_external_id = ?1 AND coin = ?2 \
               AND log_date >= ?3 AND log_date <= ?4 \
             ORDER BY log_date ASC",
        )
        .bind(account_external_id)
        .bind(coin)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list day logs: {}", e);
            DatabaseError::QueryError(format!("Failed to list day logs: {}", e))
        })?;

        Ok(records)
    }
}
