use std::time::Duration;

use xyplot_core::config::env_duration_ms;
use xyplot_core::error::CoreError;

/// Default cadence between the end of one refresh and the next tick.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Default minimum spacing between refresh starts.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(2000);

/// Default manual-refresh debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Timing for [`PollingCoordinator`](crate::PollingCoordinator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub min_interval: Duration,
    pub debounce: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            min_interval: DEFAULT_MIN_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl PollerConfig {
    /// Load from `POLL_INTERVAL_MS`, `POLL_MIN_INTERVAL_MS` and
    /// `POLL_DEBOUNCE_MS`.
    pub fn from_env() -> Result<Self, CoreError> {
        let config = Self {
            interval: env_duration_ms("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL)?,
            min_interval: env_duration_ms("POLL_MIN_INTERVAL_MS", DEFAULT_MIN_INTERVAL)?,
            debounce: env_duration_ms("POLL_DEBOUNCE_MS", DEFAULT_DEBOUNCE)?,
        };
        if config.interval.is_zero() {
            return Err(CoreError::Validation(
                "POLL_INTERVAL_MS must be greater than zero".into(),
            ));
        }
        Ok(config)
    }
}
