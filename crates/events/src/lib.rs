//! In-process lifecycle events for sweep generations.
//!
//! - [`EventBus`]: publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`SweepEvent`]: the event envelope published by the pipeline on every
//!   generation transition and batch submission.

pub mod bus;

pub use bus::{EventBus, SweepEvent};
