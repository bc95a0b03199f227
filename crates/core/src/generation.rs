//! Generation lifecycle: statuses, allowed transitions and pre-flight checks.
//!
//! ```text
//! pending ──► running ──► completed
//!    │           │
//!    └───────────┴──────► failed
//! ```
//!
//! `completed` and `failed` are terminal. `pending -> failed` is only taken
//! when a provider pre-flight check rejects the job before it starts.

use serde::{Deserialize, Serialize};

use crate::axis::ParameterCombination;
use crate::error::CoreError;

/// Status ID type matching SMALLINT in the `generation_statuses` table.
pub type StatusId = i16;

/// Generation execution status.
///
/// Discriminants match the seed order of the `generation_statuses` table.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending = 1,
    Running = 2,
    Completed = 3,
    Failed = 4,
}

impl GenerationStatus {
    /// Every status, in seed order.
    pub const ALL: [GenerationStatus; 4] = [
        GenerationStatus::Pending,
        GenerationStatus::Running,
        GenerationStatus::Completed,
        GenerationStatus::Failed,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Resolve a database status ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Lowercase name as used in API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition may leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses from which a transition into `self` is allowed.
    ///
    /// `Pending` is only ever set at creation, so it has no predecessors.
    pub fn allowed_predecessors(self) -> &'static [GenerationStatus] {
        match self {
            Self::Pending => &[],
            Self::Running => &[Self::Pending],
            Self::Completed => &[Self::Running],
            Self::Failed => &[Self::Pending, Self::Running],
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: GenerationStatus) -> bool {
        next.allowed_predecessors().contains(&self)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<GenerationStatus> for StatusId {
    fn from(value: GenerationStatus) -> Self {
        value as StatusId
    }
}

/// Validate a status transition, returning a conflict error when illegal.
pub fn validate_transition(
    from: GenerationStatus,
    to: GenerationStatus,
) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Generation cannot move from '{from}' to '{to}'"
        )))
    }
}

// ---------------------------------------------------------------------------
// Pre-flight checks
// ---------------------------------------------------------------------------

/// Field holding the text prompt.
pub const PROMPT_FIELD: &str = "prompt";

/// Require at least `min` input images.
pub fn require_images(job: &ParameterCombination, min: usize) -> Result<(), CoreError> {
    if job.images.len() < min {
        let noun = if min == 1 { "image" } else { "images" };
        return Err(CoreError::Validation(format!(
            "At least {min} input {noun} required, got {}",
            job.images.len()
        )));
    }
    Ok(())
}

/// Require a non-blank text prompt.
pub fn require_prompt(job: &ParameterCombination) -> Result<(), CoreError> {
    match job.text_param(PROMPT_FIELD) {
        Some(prompt) if !prompt.trim().is_empty() => Ok(()),
        _ => Err(CoreError::Validation(
            "A non-empty prompt is required".to_string(),
        )),
    }
}
