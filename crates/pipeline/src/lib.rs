//! Batch execution: provider seam, bounded task queue, per-generation runner,
//! batch orchestration and restart reconciliation.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod queue;
pub mod reconcile;
pub mod runner;

pub use config::QueueConfig;
pub use error::PipelineError;
pub use orchestrator::BatchOrchestrator;
pub use provider::{ProviderAdapter, ProviderError};
pub use queue::{QueueStatus, Task, TaskQueue};
pub use runner::GenerationRunner;
