//! Queue settings.

use std::time::Duration;

use xyplot_core::config::{env_duration_ms, env_parse};
use xyplot_core::error::CoreError;

/// Default number of tasks started together.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default pause between consecutive batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(2000);

/// Default number of pending `enqueue` calls the channel buffers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Settings for [`TaskQueue`](crate::queue::TaskQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Tasks started together per batch. Always at least 1.
    pub concurrency: usize,
    /// Pause after a batch when more tasks are waiting.
    pub batch_delay: Duration,
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_delay: DEFAULT_BATCH_DELAY,
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl QueueConfig {
    /// Load from environment variables with defaults.
    ///
    /// | Env var                | Default |
    /// |------------------------|---------|
    /// | `QUEUE_CONCURRENCY`    | `1`     |
    /// | `QUEUE_BATCH_DELAY_MS` | `2000`  |
    /// | `QUEUE_CAPACITY`       | `1024`  |
    pub fn from_env() -> Result<Self, CoreError> {
        Ok(Self {
            concurrency: env_parse("QUEUE_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            batch_delay: env_duration_ms("QUEUE_BATCH_DELAY_MS", DEFAULT_BATCH_DELAY)?,
            capacity: env_parse("QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
        }
        .normalized())
    }

    /// Clamp zero values up to 1.
    pub fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self.capacity = self.capacity.max(1);
        self
    }
}
