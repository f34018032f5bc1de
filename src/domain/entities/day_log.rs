//! Per-day rollup of closed trades.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One row per `(account_external_id, coin, local calendar date)`.
///
/// The member set is a superset accumulated over time: new trades for the
/// date are unioned in (dedup by position id), then the derived metrics are
/// recomputed from the full membership. A day log is never rebuilt from
/// scratch and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayLog {
    pub account_external_id: String,
    pub coin: String,
    pub date: NaiveDate,
    pub net_pnl: f64,
    pub total_trades: i64,
    pub winners: i64,
    pub losers: i64,
    pub win_rate: f64,
    pub commissions: f64,
    pub profit_factor: f64,
    /// Position ids of the member trades. Ordered set so persisted JSON is
    /// deterministic.
    pub members: BTreeSet<String>,
}

impl DayLog {
    /// An empty log for a date that has no row yet.
    pub fn empty(account_external_id: &str, coin: &str, date: NaiveDate) -> Self {
        Self {
            account_external_id: account_external_id.to_string(),
            coin: coin.to_string(),
            date,
            net_pnl: 0.0,
            total_trades: 0,
            winners: 0,
            losers: 0,
            win_rate: 0.0,
            commissions: 0.0,
            profit_factor: 0.0,
            members: BTreeSet::new(),
        }
    }
}
