//! Rollup Engine
//!
//! Maintains the per-day rollups incrementally: after a sync commit it
//! recomputes only the dates touched by the just-committed trades, merging
//! their position ids into the existing membership set. Replaying a batch
//! is a no-op because membership is a set union, never an append.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::domain::entities::day_log::DayLog;
use crate::domain::entities::trade::CanonicalTrade;
use crate::persistence::day_log_repository::DayLogRepository;
use crate::persistence::repository::TradeRepository;
use crate::persistence::{DatabaseError, DbPool};

pub struct RollupEngine {
    trades: TradeRepository,
    day_logs: DayLogRepository,
}

impl RollupEngine {
    pub fn new(pool: DbPool) -> Self {
        Self {
            trades: TradeRepository::new(pool.clone()),
            day_logs: DayLogRepository::new(pool),
        }
    }

    /// Fold a batch of newly committed trades into the day logs they touch.
    /// Returns the affected dates, oldest first.
    ///
    /// Only fully-closed trades join a day's membership; partially closed
    /// positions stay out of the rollup entirely. The batch must already be
    /// committed to the trade table — member metrics are recomputed from
    /// stored rows, not from the in-memory batch.
    pub async fn apply(
        &self,
        account_external_id: &str,
        coin: &str,
        utc_offset_minutes: i32,
        new_trades: &[CanonicalTrade],
    ) -> Result<Vec<NaiveDate>, DatabaseError> {
        let mut by_date: BTreeMap<NaiveDate, Vec<&CanonicalTrade>> = BTreeMap::new();
        for trade in new_trades.iter().filter(|t| t.is_counted()) {
            by_date
                .entry(trade.close_date(utc_offset_minutes))
                .or_default()
                .push(trade);
        }

        if by_date.is_empty() {
            return Ok(Vec::new());
        }

        let mut updated_logs = Vec::with_capacity(by_date.len());
        for (date, fresh) in &by_date {
            let existing = self
                .day_logs
                .get(account_external_id, coin, *date)
                .await?
                .map(|record| record.into_day_log())
                .unwrap_or_else(|| DayLog::empty(account_external_id, coin, *date));

            // Union, not append: replaying an already-seen trade must not
            // double-count it.
            let mut members = existing.members;
            members.extend(fresh.iter().map(|t| t.position_id.clone()));

            let member_ids: Vec<String> = members.iter().cloned().collect();
            let member_trades: Vec<CanonicalTrade> = self
                .trades
                .by_position_ids(account_external_id, coin, &member_ids)
                .await?
                .into_iter()
                .map(|record| record.into_canonical())
                .filter(|t| t.is_counted())
                .collect();

            updated_logs.push(build_day_log(
                account_external_id,
                coin,
                *date,
                members,
                &member_trades,
            ));
        }

        self.day_logs.upsert_all(&updated_logs).await?;

        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        debug!(
            "Rolled up {} trades into {} day logs for {}/{}",
            new_trades.len(),
            dates.len(),
            account_external_id,
            coin
        );
        Ok(dates)
    }
}

/// Recompute a day's derived metrics from its full membership.
fn build_day_log(
    account_external_id: &str,
    coin: &str,
    date: NaiveDate,
    members: BTreeSet<String>,
    member_trades: &[CanonicalTrade],
) -> DayLog {
    let mut sum_win = BigDecimal::zero();
    let mut sum_loss = BigDecimal::zero();
    let mut net = BigDecimal::zero();
    let mut commissions = BigDecimal::zero();
    let mut winners = 0i64;
    let mut losers = 0i64;

    for trade in member_trades {
        let profit = trade.net_profit_decimal();
        if profit > BigDecimal::zero() {
            winners += 1;
            sum_win += &profit;
        } else if profit < BigDecimal::zero() {
            losers += 1;
            sum_loss += &profit;
        }
        net += profit;
        commissions += trade.commission_decimal();
    }

    let total_trades = member_trades.len() as i64;
    let win_rate = if total_trades == 0 {
        0.0
    } else {
        winners as f64 / total_trades as f64 * 100.0
    };

    let sum_win_f = sum_win.to_f64().unwrap_or(0.0);
    let profit_factor = if losers == 0 {
        // No losing trades: report the raw winning sum, not infinity.
        sum_win_f
    } else {
        sum_win_f / sum_loss.to_f64().unwrap_or(0.0).abs()
    };

    DayLog {
        account_external_id: account_external_id.to_string(),
        coin: coin.to_string(),
        date,
        net_pnl: net.to_f64().unwrap_or(0.0),
        total_trades,
        winners,
        losers,
        win_rate,
        commissions: commissions.to_f64().unwrap_or(0.0),
        profit_factor,
        members,
    }
}
