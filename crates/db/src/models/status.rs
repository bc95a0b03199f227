//! Status lookup helpers for the `generation_statuses` table.
//!
//! The enum itself lives in `xyplot_core` so pure logic can use it; this
//! module adds the SQL-facing constants.

pub use xyplot_core::generation::{GenerationStatus, StatusId};

/// Terminal statuses: completed, failed.
pub const TERMINAL_STATUSES: [StatusId; 2] = [
    GenerationStatus::Completed as StatusId,
    GenerationStatus::Failed as StatusId,
];

/// Non-terminal statuses: pending, running.
pub const ACTIVE_STATUSES: [StatusId; 2] = [
    GenerationStatus::Pending as StatusId,
    GenerationStatus::Running as StatusId,
];

/// Status IDs from which `to` may be entered, for `status_id = ANY($n)`.
pub fn predecessor_ids(to: GenerationStatus) -> Vec<StatusId> {
    to.allowed_predecessors().iter().map(|s| s.id()).collect()
}
