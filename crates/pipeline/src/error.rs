use xyplot_core::error::CoreError;
use xyplot_db::StoreError;

/// Errors surfaced by batch orchestration.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The request was rejected before any row was created.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to encode generation parameters: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task queue is closed")]
    QueueClosed,
}
