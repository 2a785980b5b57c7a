//! Ledger engine configuration
//!
//! Bounds for every wait and retry the engine performs, plus the cashback
//! rules. Zero values are rejected with a warning and replaced by defaults,
//! so a misconfigured engine never waits forever or retries zero times.

use crate::core::CashbackPolicy;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    /// Upper bound on waiting for both account locks of a transfer
    pub lock_timeout: Duration,
    /// Compare-and-swap attempts before a transfer fails with `Contention`
    pub max_cas_retries: u32,
    /// Retries of a transient storage failure before it is surfaced
    pub storage_retries: u32,
    /// Pause between storage retries outside the commit section
    pub storage_backoff: Duration,
    /// Number of idempotency keys retained
    pub idempotency_capacity: usize,
    pub cashback: CashbackPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(250),
            max_cas_retries: 5,
            storage_retries: 3,
            storage_backoff: Duration::from_millis(10),
            idempotency_capacity: 10_000,
            cashback: CashbackPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Create a config with custom bounds, falling back to defaults for zero values
    pub fn new(lock_timeout: Duration, max_cas_retries: u32, idempotency_capacity: usize) -> Self {
        let default = Self::default();

        let lock_timeout = if lock_timeout.is_zero() {
            warn!(
                default = ?default.lock_timeout,
                "invalid lock_timeout (0), using default"
            );
            default.lock_timeout
        } else {
            lock_timeout
        };

        let max_cas_retries = if max_cas_retries == 0 {
            warn!(
                default = default.max_cas_retries,
                "invalid max_cas_retries (0), using default"
            );
            default.max_cas_retries
        } else {
            max_cas_retries
        };

        let idempotency_capacity = if idempotency_capacity == 0 {
            warn!(
                default = default.idempotency_capacity,
                "invalid idempotency_capacity (0), using default"
            );
            default.idempotency_capacity
        } else {
            idempotency_capacity
        };

        Self {
            lock_timeout,
            max_cas_retries,
            idempotency_capacity,
            ..default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.max_cas_retries, 5);
        assert_eq!(config.storage_retries, 3);
        assert_eq!(config.idempotency_capacity, 10_000);
    }

    #[rstest]
    #[case::all_custom(Duration::from_millis(40), 7, 64, Duration::from_millis(40), 7, 64)]
    #[case::zero_timeout(Duration::ZERO, 7, 64, Duration::from_millis(250), 7, 64)]
    #[case::zero_retries(Duration::from_millis(40), 0, 64, Duration::from_millis(40), 5, 64)]
    #[case::zero_capacity(Duration::from_millis(40), 7, 0, Duration::from_millis(40), 7, 10_000)]
    fn test_new_falls_back_for_zero_values(
        #[case] lock_timeout: Duration,
        #[case] retries: u32,
        #[case] capacity: usize,
        #[case] expected_timeout: Duration,
        #[case] expected_retries: u32,
        #[case] expected_capacity: usize,
    ) {
        let config = LedgerConfig::new(lock_timeout, retries, capacity);

        assert_eq!(config.lock_timeout, expected_timeout);
        assert_eq!(config.max_cas_retries, expected_retries);
        assert_eq!(config.idempotency_capacity, expected_capacity);
    }
}
