//! Database Models
//!
//! Persistent row shapes for trades, sync cursors, and day logs, plus the
//! conversions to and from the domain entities.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use tracing::warn;

use crate::domain::entities::day_log::DayLog;
use crate::domain::entities::trade::{CanonicalTrade, InstrumentKind, PositionSide};

/// Trade row in the database. Side and instrument are stored as the same
/// strings the CHECK constraints enforce; monetary columns stay TEXT.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub account_external_id: String,
    pub position_id: String,
    pub coin: String,
    pub symbol: String,
    pub position_side: String, // "LONG" or "SHORT"
    pub isolated: bool,
    pub open_time: i64,
    pub update_time: i64,
    pub avg_price: String,
    pub avg_close_price: String,
    pub realised_profit: String,
    pub net_profit: String,
    pub position_amt: String,
    pub close_position_amt: String,
    pub leverage: i64,
    pub close_all_positions: bool,
    pub position_commission: String,
    pub total_funding: String,
    pub instrument: String, // "perpetual" or "standard"
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn into_canonical(self) -> CanonicalTrade {
        CanonicalTrade {
            account_external_id: self.account_external_id,
            position_id: self.position_id,
            coin: self.coin,
            symbol: self.symbol,
            // CHECK constraints guarantee these columns; default defensively
            // only for rows written by older schema versions.
            position_side: PositionSide::from_str_loose(&self.position_side)
                .unwrap_or(PositionSide::Long),
            isolated: self.isolated,
            open_time: self.open_time,
            update_time: self.update_time,
            avg_price: self.avg_price,
            avg_close_price: self.avg_close_price,
            realised_profit: self.realised_profit,
            net_profit: self.net_profit,
            position_amt: self.position_amt,
            close_position_amt: self.close_position_amt,
            leverage: self.leverage,
            close_all_positions: self.close_all_positions,
            position_commission: self.position_commission,
            total_funding: self.total_funding,
            instrument: if self.instrument == "standard" {
                InstrumentKind::Standard
            } else {
                InstrumentKind::Perpetual
            },
        }
    }
}

/// Sync cursor row in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncCursorRecord {
    pub account_external_id: String,
    pub coin: String,
    pub last_synced_at_ms: i64,
    pub updated_at: DateTime<Utc>,
}

/// Day log row in the database. `members` is a JSON array of position ids.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DayLogRecord {
    pub account_external_id: String,
    pub log_date: NaiveDate,
    pub coin: String,
    pub net_pnl: f64,
    pub total_trades: i64,
    pub winners: i64,
    pub losers: i64,
    pub win_rate: f64,
    pub commissions: f64,
    pub profit_factor: f64,
    pub members: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DayLogRecord {
    pub fn into_day_log(self) -> DayLog {
        let members: BTreeSet<String> = match serde_json::from_str(&self.members) {
            Ok(set) => set,
            Err(e) => {
                warn!(
                    "Unreadable member set for day log {}/{}/{}: {}",
                    self.account_external_id, self.coin, self.log_date, e
                );
                BTreeSet::new()
            }
        };

        DayLog {
            account_external_id: self.account_external_id,
            coin: self.coin,
            date: self.log_date,
            net_pnl: self.net_pnl,
            total_trades: self.total_trades,
            winners: self.winners,
            losers: self.losers,
            win_rate: self.win_rate,
            commissions: self.commissions,
            profit_factor: self.profit_factor,
            members,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> DayLogRecord {
        DayLogRecord {
            account_external_id: "acct-1".to_string(),
            log_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            coin: "USDT".to_string(),
            net_pnl: 10.0,
            total_trades: 2,
            winners: 1,
            losers: 1,
            win_rate: 50.0,
            commissions: 1.2,
            profit_factor: 3.0,
            members: r#"["a","b"]"#.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_day_log_members_round_trip() {
        let log = sample_record().into_day_log();
        assert_eq!(log.members.len(), 2);
        assert!(log.members.contains("a"));
        assert!(log.members.contains("b"));
    }

    #[test]
    fn test_day_log_bad_members_degrade_to_empty() {
        let mut record = sample_record();
        record.members = "not-json".to_string();
        let log = record.into_day_log();
        assert!(log.members.is_empty());
    }

    #[test]
    fn test_trade_record_side_conversion() {
        let record = TradeRecord {
            account_external_id: "acct-1".to_string(),
            position_id: "p1".to_string(),
            coin: "USDT".to_string(),
            symbol: "BTC-USDT".to_string(),
            position_side: "SHORT".to_string(),
            isolated: true,
            open_time: 1,
            update_time: 2,
            avg_price: "1".to_string(),
            avg_close_price: "1".to_string(),
            realised_profit: "0".to_string(),
            net_profit: "0".to_string(),
            position_amt: "1".to_string(),
            close_position_amt: "1".to_string(),
            leverage: 5,
            close_all_positions: true,
            position_commission: "0".to_string(),
            total_funding: "0".to_string(),
            instrument: "perpetual".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let trade = record.into_canonical();
        assert_eq!(trade.position_side, PositionSide::Short);
        assert_eq!(trade.instrument, InstrumentKind::Perpetual);
    }
}
