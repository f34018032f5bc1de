//! traderlog — trade synchronization and rollup engine
//!
//! The backend of a trading journal: pulls closed-position history from
//! brokerage APIs, normalizes and deduplicates it, advances an incremental
//! sync cursor, and maintains per-day rollups and aggregate statistics
//! without re-scanning full trade history.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod secrets;
