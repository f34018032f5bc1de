//! Per-key sync run lock.
//!
//! The cursor protocol is not safe against two concurrent runs for the
//! same `(account, coin)` racing each other, so the engine serializes them
//! explicitly instead of trusting every caller to. Second and later
//! attempts while a run is in flight are rejected, not queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Registry of in-flight sync runs.
#[derive(Debug, Clone, Default)]
pub struct SyncLockRegistry {
    in_flight: Arc<Mutex<HashSet<(String, String)>>>,
}

impl SyncLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot for `(account_external_id, coin)`. Returns `None`
    /// when a run already holds it. The slot is released when the returned
    /// guard drops, including on panic or early return.
    pub fn try_acquire(&self, account_external_id: &str, coin: &str) -> Option<SyncLockGuard> {
        let key = (account_external_id.to_string(), coin.to_string());
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(SyncLockGuard {
            key,
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

/// RAII guard for one in-flight run.
#[derive(Debug)]
pub struct SyncLockGuard {
    key: (String, String),
    in_flight: Arc<Mutex<HashSet<(String, String)>>>,
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
    }
}
