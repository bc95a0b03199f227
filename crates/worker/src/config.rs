use anyhow::Context;
use xyplot_pipeline::QueueConfig;
use xyplot_poller::PollerConfig;

/// Everything the worker reads from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Absent when the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub queue: QueueConfig,
    pub poller: PollerConfig,
}

impl WorkerConfig {
    /// Load every section from environment variables with defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            queue: QueueConfig::from_env().context("Invalid queue configuration")?,
            poller: PollerConfig::from_env().context("Invalid poller configuration")?,
        })
    }

    /// The database URL, or an error naming the missing variable.
    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            queue: QueueConfig::default(),
            poller: PollerConfig::default(),
        }
    }
}
