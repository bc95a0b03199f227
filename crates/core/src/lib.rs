//! Pure domain logic for axis-sweep batch generation.
//!
//! Everything in this crate is synchronous and free of I/O: axis expansion,
//! parameter values, the generation lifecycle, batch descriptors and output
//! naming. The store, queue and poller crates build on top of it.

pub mod axis;
pub mod batch;
pub mod config;
pub mod error;
pub mod generation;
pub mod naming;
pub mod params;
pub mod types;
