//! Engine configuration.

/// Tunables for the sync pipeline. Batch size and delay bound the load we
/// put on a provider's rate limiter; the lookback seeds the window for an
/// account's first sync.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Window start for an account that has never synced: now minus this
    /// many days.
    pub first_sync_lookback_days: i64,

    /// Symbols fetched concurrently per batch during phase 2.
    pub batch_size: usize,

    /// Pause between consecutive batches, milliseconds.
    pub batch_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            first_sync_lookback_days: 30,
            batch_size: 5,
            batch_delay_ms: 1_000,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, keeping defaults for
    /// anything missing or out of range.
    pub fn from_env() -> SyncConfig {
        let mut config = SyncConfig::default();

        if let Ok(days) = std::env::var("SYNC_FIRST_LOOKBACK_DAYS") {
            match days.parse::<i64>() {
                Ok(value) if (1..=365).contains(&value) => {
                    config.first_sync_lookback_days = value;
                }
                _ => {
                    tracing::warn!(
                        "Invalid SYNC_FIRST_LOOKBACK_DAYS '{}', using default: {}",
                        days,
                        config.first_sync_lookback_days
                    );
                }
            }
        }

        if let Ok(size) = std::env::var("SYNC_BATCH_SIZE") {
            match size.parse::<usize>() {
                Ok(value) if (1..=50).contains(&value) => {
                    config.batch_size = value;
                }
                _ => {
                    tracing::warn!(
                        "Invalid SYNC_BATCH_SIZE '{}', using default: {}",
                        size,
                        config.batch_size
                    );
                }
            }
        }

        if let Ok(delay) = std::env::var("SYNC_BATCH_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(value) if value <= 60_000 => {
                    config.batch_delay_ms = value;
                }
                _ => {
                    tracing::warn!(
                        "Invalid SYNC_BATCH_DELAY_MS '{}', using default: {}",
                        delay,
                        config.batch_delay_ms
                    );
                }
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.first_sync_lookback_days, 30);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.batch_delay_ms, 1_000);
    }
}
