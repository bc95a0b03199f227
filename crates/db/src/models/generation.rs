//! Generation entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use xyplot_core::axis::ParameterCombination;
use xyplot_core::types::{DbId, Timestamp};

use super::status::{GenerationStatus, StatusId};

/// A row from the `generations` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Generation {
    pub id: DbId,
    /// Weak reference to the generation configuration. Not a foreign key.
    pub workflow_id: DbId,
    pub batch_id: Option<Uuid>,
    pub x_index: Option<i32>,
    pub y_index: Option<i32>,
    pub x_value: Option<String>,
    pub y_value: Option<String>,
    pub parameters: serde_json::Value,
    pub status_id: StatusId,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Generation {
    /// Decode the stored status. `None` only for an unknown status ID.
    pub fn status(&self) -> Option<GenerationStatus> {
        GenerationStatus::from_id(self.status_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(GenerationStatus::is_terminal)
    }
}

/// DTO for inserting a new pending generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGeneration {
    pub workflow_id: DbId,
    pub batch_id: Option<Uuid>,
    pub x_index: Option<i32>,
    pub y_index: Option<i32>,
    pub x_value: Option<String>,
    pub y_value: Option<String>,
    pub parameters: serde_json::Value,
}

impl CreateGeneration {
    /// Build the insert DTO for one sweep cell.
    ///
    /// `parameters` stores the axis field names next to the resolved cell so
    /// a batch can be described again from its rows alone.
    pub fn for_cell(
        workflow_id: DbId,
        batch_id: Uuid,
        x_field: &str,
        y_field: &str,
        cell: &ParameterCombination,
    ) -> Result<Self, serde_json::Error> {
        let parameters = serde_json::to_value(CellParameters {
            x_field: x_field.to_string(),
            y_field: y_field.to_string(),
            cell: cell.clone(),
        })?;
        Ok(Self {
            workflow_id,
            batch_id: Some(batch_id),
            x_index: Some(cell.x_index as i32),
            y_index: Some(cell.y_index as i32),
            x_value: Some(cell.x_value.clone()),
            y_value: Some(cell.y_value.clone()),
            parameters,
        })
    }
}

/// Shape of `generations.parameters` for sweep cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellParameters {
    pub x_field: String,
    pub y_field: String,
    pub cell: ParameterCombination,
}

impl CellParameters {
    /// Decode the parameters column of a sweep row.
    pub fn from_row(row: &Generation) -> Result<Self, serde_json::Error> {
        serde_json::from_value(row.parameters.clone())
    }
}

/// Partial update applied through [`GenerationStore::update`].
///
/// `started_at` and `completed_at` are never set by callers: the store
/// stamps `started_at` on entering `running` and `completed_at` on entering
/// a terminal status.
///
/// [`GenerationStore::update`]: crate::store::GenerationStore::update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateGeneration {
    pub status: Option<GenerationStatus>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

impl UpdateGeneration {
    /// `pending -> running`.
    pub fn running() -> Self {
        Self {
            status: Some(GenerationStatus::Running),
            ..Default::default()
        }
    }

    /// `running -> completed` with the result location.
    pub fn completed(result_url: impl Into<String>) -> Self {
        Self {
            status: Some(GenerationStatus::Completed),
            result_url: Some(result_url.into()),
            error_message: None,
        }
    }

    /// `pending | running -> failed` with the error message.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: Some(GenerationStatus::Failed),
            result_url: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Check the field/status pairing rules.
    ///
    /// `result_url` may only accompany `completed`, `error_message` only
    /// `failed`.
    pub fn check(&self) -> Result<(), String> {
        if self.result_url.is_some() && self.status != Some(GenerationStatus::Completed) {
            return Err("result_url may only be set together with status 'completed'".into());
        }
        if self.error_message.is_some() && self.status != Some(GenerationStatus::Failed) {
            return Err("error_message may only be set together with status 'failed'".into());
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.result_url.is_none() && self.error_message.is_none()
    }
}

/// Optional filters for listing and bulk deletion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationFilter {
    pub status: Option<GenerationStatus>,
    pub workflow_id: Option<DbId>,
    pub batch_id: Option<Uuid>,
}

impl GenerationFilter {
    pub fn matches(&self, row: &Generation) -> bool {
        self.status.map_or(true, |s| row.status_id == s.id())
            && self.workflow_id.map_or(true, |w| row.workflow_id == w)
            && self.batch_id.map_or(true, |b| row.batch_id == Some(b))
    }
}

/// Maximum page size for `list_recent`.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Default page size for `list_recent`.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Clamp a requested page size into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_constructors_pass_check() {
        assert!(UpdateGeneration::running().check().is_ok());
        assert!(UpdateGeneration::completed("https://cdn/x.png").check().is_ok());
        assert!(UpdateGeneration::failed("boom").check().is_ok());
    }

    #[test]
    fn result_url_requires_completed() {
        let patch = UpdateGeneration {
            status: Some(GenerationStatus::Running),
            result_url: Some("u".into()),
            error_message: None,
        };
        assert!(patch.check().is_err());
    }

    #[test]
    fn error_message_requires_failed() {
        let patch = UpdateGeneration {
            error_message: Some("e".into()),
            ..Default::default()
        };
        assert!(patch.check().is_err());
    }

    #[test]
    fn cell_parameters_keep_axis_fields() {
        let cell = ParameterCombination {
            x_index: 1,
            y_index: 0,
            x_value: "2".into(),
            y_value: "10".into(),
            images: vec![],
            other_params: Default::default(),
            generation_id: None,
        };
        let input = CreateGeneration::for_cell(5, Uuid::nil(), "seed", "steps", &cell).unwrap();
        assert_eq!(input.x_index, Some(1));
        assert_eq!(input.parameters["x_field"], "seed");
        assert_eq!(input.parameters["cell"]["y_value"], "10");
    }

    #[test]
    fn clamp_limit_bounds() {
        assert_eq!(clamp_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIST_LIMIT);
    }
}
