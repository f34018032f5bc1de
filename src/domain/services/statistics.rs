//! Statistics Engine
//!
//! Pure aggregation over canonical trades for an arbitrary window. Only
//! fully-closed positions count toward performance metrics; partially
//! closed positions are excluded so an in-progress position is never
//! double-counted. All functions are total: an empty window yields zeroed
//! aggregates, never an error.
//!
//! Monetary sums are accumulated as `BigDecimal` parsed from the exact
//! strings the providers reported (invalid values count as zero) and only
//! collapsed to `f64` in the final result shapes.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::entities::trade::CanonicalTrade;

/// Gross winning P&L over absolute gross losing P&L.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitFactor {
    /// `sum_win / |sum_loss|`; equals `sum_win` when there are no losses.
    /// A perfect window must not report 0.
    pub value: f64,
    pub sum_win: f64,
    /// Signed sum of losing trades (<= 0).
    pub sum_loss: f64,
}

/// Win-rate over the counted trades.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeWin {
    /// `total_win / max(total_trades, 1) * 100`.
    pub value: f64,
    pub total_win: i64,
    pub total_loss: i64,
}

/// Ratio of the average winner to the average loser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvgWinLoss {
    /// `avg_win / avg_loss` when both sides have trades, else 0.
    pub value: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetPnl {
    pub value: f64,
    pub total_trades: i64,
}

/// The full aggregate for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub profit_factor: ProfitFactor,
    pub trade_win: TradeWin,
    pub avg_win_loss: AvgWinLoss,
    pub net_pnl: NetPnl,
}

/// Per-symbol aggregate, plus mean holding time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolStatistics {
    pub symbol: String,
    #[serde(flatten)]
    pub statistics: Statistics,
    /// Mean of `update_time - open_time` across counted trades, in ms.
    pub avg_duration_ms: f64,
}

/// Per-day aggregate; the series behind calendar and chart views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStatistics {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub statistics: Statistics,
}

/// Aggregate every counted trade in the slice.
pub fn compute(trades: &[CanonicalTrade]) -> Statistics {
    let mut sum_win = BigDecimal::zero();
    let mut sum_loss = BigDecimal::zero();
    let mut net = BigDecimal::zero();
    let mut total_win = 0i64;
    let mut total_loss = 0i64;
    let mut total_trades = 0i64;

    for trade in trades.iter().filter(|t| t.is_counted()) {
        let profit = trade.net_profit_decimal();
        total_trades += 1;
        if profit > BigDecimal::zero() {
            total_win += 1;
            sum_win += &profit;
        } else if profit < BigDecimal::zero() {
            total_loss += 1;
            sum_loss += &profit;
        }
        net += profit;
    }

    let sum_win_f = to_f64(&sum_win);
    let sum_loss_f = to_f64(&sum_loss);
    let loss_abs = sum_loss_f.abs();

    let profit_factor_value = if total_loss == 0 {
        // No losing trades: the factor is the raw winning sum, not
        // infinity and not zero.
        sum_win_f
    } else {
        sum_win_f / loss_abs
    };

    let trade_win_value = total_win as f64 / (total_trades.max(1)) as f64 * 100.0;

    let (avg_win, avg_loss) = (
        if total_win > 0 { sum_win_f / total_win as f64 } else { 0.0 },
        if total_loss > 0 { loss_abs / total_loss as f64 } else { 0.0 },
    );
    let avg_win_loss_value = if total_win > 0 && total_loss > 0 {
        avg_win / avg_loss
    } else {
        0.0
    };

    Statistics {
        profit_factor: ProfitFactor {
            value: profit_factor_value,
            sum_win: sum_win_f,
            sum_loss: sum_loss_f,
        },
        trade_win: TradeWin {
            value: trade_win_value,
            total_win,
            total_loss,
        },
        avg_win_loss: AvgWinLoss {
            value: avg_win_loss_value,
            avg_win,
            avg_loss,
        },
        net_pnl: NetPnl {
            value: to_f64(&net),
            total_trades,
        },
    }
}

/// Same aggregate grouped by symbol, with mean trade duration.
pub fn compute_by_symbol(trades: &[CanonicalTrade]) -> Vec<SymbolStatistics> {
    let mut groups: BTreeMap<&str, Vec<CanonicalTrade>> = BTreeMap::new();
    for trade in trades.iter().filter(|t| t.is_counted()) {
        groups.entry(&trade.symbol).or_default().push(trade.clone());
    }

    groups
        .into_iter()
        .map(|(symbol, group)| {
            let total_duration: i64 = group.iter().map(|t| t.duration_ms()).sum();
            let avg_duration_ms = if group.is_empty() {
                0.0
            } else {
                total_duration as f64 / group.len() as f64
            };
            SymbolStatistics {
                symbol: symbol.to_string(),
                statistics: compute(&group),
                avg_duration_ms,
            }
        })
        .collect()
}

/// Same aggregate grouped by close date in the account's local day
/// boundary, oldest first.
pub fn compute_by_day(trades: &[CanonicalTrade], utc_offset_minutes: i32) -> Vec<DailyStatistics> {
    let mut groups: BTreeMap<NaiveDate, Vec<CanonicalTrade>> = BTreeMap::new();
    for trade in trades.iter().filter(|t| t.is_counted()) {
        groups
            .entry(trade.close_date(utc_offset_minutes))
            .or_default()
            .push(trade.clone());
    }

    groups
        .into_iter()
        .map(|(date, group)| DailyStatistics {
            date,
            statistics: compute(&group),
        })
        .collect()
}

fn to_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
