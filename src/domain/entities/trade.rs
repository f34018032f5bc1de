//! Canonical trade shapes.
//!
//! Every provider adapter normalizes its wire payloads into
//! [`CanonicalTrade`] so the rest of the engine never sees
//! provider-specific fields. Monetary amounts are carried as the exact
//! decimal strings the provider reported; they are only parsed at
//! aggregation time (see `domain::services::statistics`).

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::provider::Provider;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<PositionSide> {
        match s.to_uppercase().as_str() {
            "LONG" | "BUY" => Some(PositionSide::Long),
            "SHORT" | "SELL" => Some(PositionSide::Short),
            _ => None,
        }
    }
}

/// Contract family a trade belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Perpetual,
    Standard,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Perpetual => "perpetual",
            InstrumentKind::Standard => "standard",
        }
    }
}

/// One closed (or partially closed) position, normalized across providers.
///
/// Identity is `(account_external_id, position_id, coin)` — the idempotency
/// key for upsert. A provider re-reporting the same position id with fresher
/// close data supersedes the stored row in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTrade {
    pub account_external_id: String,
    pub position_id: String,
    pub coin: String,
    pub symbol: String,
    pub position_side: PositionSide,
    pub isolated: bool,
    /// Epoch milliseconds.
    pub open_time: i64,
    /// Epoch milliseconds of the last provider-side update (close time for
    /// fully closed positions).
    pub update_time: i64,
    pub avg_price: String,
    pub avg_close_price: String,
    /// Exact decimal string as reported by the provider.
    pub realised_profit: String,
    /// realised profit + funding + commission, exact decimal string.
    pub net_profit: String,
    pub position_amt: String,
    pub close_position_amt: String,
    pub leverage: i64,
    /// Whether this record represents a fully closed position.
    pub close_all_positions: bool,
    pub position_commission: String,
    pub total_funding: String,
    pub instrument: InstrumentKind,
}

impl CanonicalTrade {
    /// Only fully-closed positions count toward day logs and performance
    /// metrics; partially closed ones are stored but excluded so an
    /// in-progress position is never double-counted.
    pub fn is_counted(&self) -> bool {
        self.close_all_positions
    }

    /// Net profit parsed for aggregation; malformed values fall back to zero.
    pub fn net_profit_decimal(&self) -> BigDecimal {
        parse_decimal(&self.net_profit)
    }

    pub fn commission_decimal(&self) -> BigDecimal {
        parse_decimal(&self.position_commission)
    }

    /// Calendar date the position closed on, in the account's local day
    /// boundary. The UTC timestamp is shifted by the account offset before
    /// taking the date part.
    pub fn close_date(&self, utc_offset_minutes: i32) -> NaiveDate {
        local_date(self.update_time, utc_offset_minutes)
    }

    /// Holding time in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.update_time - self.open_time).max(0)
    }
}

/// A currently open position, reported for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub provider: Provider,
    pub position_id: String,
    pub symbol: String,
    pub coin: String,
    pub position_side: PositionSide,
    pub isolated: bool,
    pub avg_price: String,
    pub position_amt: String,
    pub unrealised_profit: String,
    pub leverage: i64,
}

/// Parse a provider decimal string; anything unparseable counts as zero so
/// one bad record cannot poison an aggregate.
pub fn parse_decimal(raw: &str) -> BigDecimal {
    BigDecimal::from_str(raw.trim()).unwrap_or_else(|_| BigDecimal::zero())
}

/// Shift an epoch-ms timestamp by a UTC offset and take the date part.
pub fn local_date(epoch_ms: i64, utc_offset_minutes: i32) -> NaiveDate {
    let shifted = epoch_ms + i64::from(utc_offset_minutes) * 60_000;
    chrono::DateTime::from_timestamp_millis(shifted)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}
