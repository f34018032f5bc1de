//! Sync-run value types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The `[start, end]` time range one sync run fetches, in epoch ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl SyncWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }
}

/// Result of one `sync_account` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// False when the window contained nothing new.
    pub synced: bool,
    /// The window end the cursor was advanced to.
    pub sync_time_ms: i64,
    /// Local close date of the earliest trade landed by this run, when any.
    pub earliest_trade_date: Option<NaiveDate>,
}
