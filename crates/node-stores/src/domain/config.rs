//! # Store Configuration
//!
//! Reservation and checksum policy of a store, plus the cadence of its
//! background sweeper.

use std::time::Duration;

use super::errors::StoreError;

/// Per-store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Outstanding reservations allowed at once.
    pub max_reservations: usize,
    /// Ceiling on the sum of outstanding reservation sizes.
    pub max_reserved_bytes: u64,
    /// How long an unfilled reservation is held.
    pub reservation_ttl: Duration,
    /// Refuse reservations while the engine has less than this share of
    /// its capacity free (0-100).
    pub min_available_percent: u8,
    /// Upper bound on waiting for a pending checksum computation.
    pub checksum_wait_timeout: Duration,
    /// How long a finished checksum record is kept.
    pub checksum_retention: Duration,
    /// Period of the background sweeper.
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_reservations: 4,
            max_reserved_bytes: 256 << 20,
            reservation_ttl: Duration::from_secs(30),
            min_available_percent: 5,
            checksum_wait_timeout: Duration::from_secs(5),
            checksum_retention: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl StoreConfig {
    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            max_reservations: 4,
            max_reserved_bytes: 1 << 20,
            reservation_ttl: Duration::from_secs(1),
            min_available_percent: 5,
            checksum_wait_timeout: Duration::from_millis(500),
            checksum_retention: Duration::from_secs(60),
            sweep_interval: Duration::from_millis(50),
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_reservations == 0 {
            return Err(StoreError::InvalidConfig(
                "max_reservations must be at least 1".into(),
            ));
        }
        if self.max_reserved_bytes == 0 {
            return Err(StoreError::InvalidConfig(
                "max_reserved_bytes must be positive".into(),
            ));
        }
        if self.reservation_ttl.is_zero() {
            return Err(StoreError::InvalidConfig(
                "reservation_ttl must be positive".into(),
            ));
        }
        if self.min_available_percent > 100 {
            return Err(StoreError::InvalidConfig(format!(
                "min_available_percent {} exceeds 100",
                self.min_available_percent
            )));
        }
        if self.checksum_retention.is_zero() {
            return Err(StoreError::InvalidConfig(
                "checksum_retention must be positive".into(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "sweep_interval must be positive".into(),
            ));
        }
        Ok(())
    }
}
