//! Process wiring for the sweep pipeline.
//!
//! [`SweepService`] assembles the store, event bus, task queue, orchestrator,
//! polling coordinator around a provider adapter supplied by the embedding
//! application. The `xyplot-worker` binary is the one-shot maintenance side:
//! it checks the database and applies migrations.

pub mod config;
pub mod event_log;
pub mod service;

pub use config::WorkerConfig;
pub use service::SweepService;
