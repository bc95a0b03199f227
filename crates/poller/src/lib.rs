//! Shared polling for generation status.
//!
//! One [`PollingCoordinator`] per process multiplexes any number of
//! subscribers onto a single refresh loop. [`GenerationWatcher`] builds on it
//! to follow a fixed set of generations until they all finish.

pub mod config;
pub mod coordinator;
pub mod timing;
pub mod watcher;

pub use config::PollerConfig;
pub use coordinator::{CoordinatorStatus, PollControl, PollError, PollingCoordinator, SubscriptionId};
pub use watcher::{GenerationWatcher, WatchSnapshot};
