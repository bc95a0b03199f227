//! Sweep batch request and descriptor types.
//!
//! A [`BatchRequest`] is what a client submits; a [`BatchDescriptor`] is what
//! it gets back once every cell has a generation row. The descriptor is the
//! join key between matrix position and durable generation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::axis::{self, ParameterCombination};
use crate::error::CoreError;
use crate::params::DefaultParams;
use crate::types::DbId;

/// Input for enqueueing a sweep batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub x_field: String,
    pub x_values: Vec<String>,
    pub y_field: String,
    pub y_values: Vec<String>,
    #[serde(default)]
    pub default_params: DefaultParams,
    /// Generation configuration the batch runs against.
    pub workflow_id: DbId,
}

impl BatchRequest {
    /// Validate the axis configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        axis::validate_axis_config(&self.x_field, &self.x_values, &self.y_field, &self.y_values)
    }

    /// Expand the request into its matrix cells.
    pub fn expand(&self) -> Vec<ParameterCombination> {
        axis::expand(
            &self.x_field,
            &self.x_values,
            &self.y_field,
            &self.y_values,
            &self.default_params,
        )
    }
}

/// One enqueued cell of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub generation_id: DbId,
    pub x_index: usize,
    pub y_index: usize,
    pub x_value: String,
    pub y_value: String,
}

/// Summary of an enqueued batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    pub batch_id: Uuid,
    pub x_field: String,
    pub y_field: String,
    pub total_combinations: usize,
    pub x_count: usize,
    pub y_count: usize,
    /// Ordered row-major by Y.
    pub jobs: Vec<BatchJob>,
}

impl BatchDescriptor {
    /// Build a descriptor from its jobs, deriving the axis sizes from the
    /// highest indices present.
    pub fn from_jobs(
        batch_id: Uuid,
        x_field: impl Into<String>,
        y_field: impl Into<String>,
        mut jobs: Vec<BatchJob>,
    ) -> Self {
        jobs.sort_by_key(|j| (j.y_index, j.x_index));
        let x_count = jobs.iter().map(|j| j.x_index + 1).max().unwrap_or(0);
        let y_count = jobs.iter().map(|j| j.y_index + 1).max().unwrap_or(0);
        Self {
            batch_id,
            x_field: x_field.into(),
            y_field: y_field.into(),
            total_combinations: jobs.len(),
            x_count,
            y_count,
            jobs,
        }
    }

    /// Find the job at a matrix position.
    pub fn job_at(&self, x_index: usize, y_index: usize) -> Option<&BatchJob> {
        self.jobs
            .iter()
            .find(|j| j.x_index == x_index && j.y_index == y_index)
    }

    /// Generation ids in matrix order.
    pub fn generation_ids(&self) -> Vec<DbId> {
        self.jobs.iter().map(|j| j.generation_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: DbId, x: usize, y: usize) -> BatchJob {
        BatchJob {
            generation_id: id,
            x_index: x,
            y_index: y,
            x_value: format!("x{x}"),
            y_value: format!("y{y}"),
        }
    }

    #[test]
    fn descriptor_sorts_row_major_and_derives_counts() {
        let jobs = vec![job(4, 1, 1), job(1, 0, 0), job(3, 0, 1), job(2, 1, 0)];
        let d = BatchDescriptor::from_jobs(Uuid::new_v4(), "seed", "steps", jobs);
        assert_eq!(d.total_combinations, 4);
        assert_eq!(d.x_count, 2);
        assert_eq!(d.y_count, 2);
        assert_eq!(d.generation_ids(), vec![1, 2, 3, 4]);
        assert_eq!(d.job_at(0, 1).map(|j| j.generation_id), Some(3));
        assert!(d.job_at(2, 0).is_none());
    }

    #[test]
    fn empty_descriptor_has_zero_counts() {
        let d = BatchDescriptor::from_jobs(Uuid::new_v4(), "a", "b", Vec::new());
        assert_eq!((d.x_count, d.y_count, d.total_combinations), (0, 0, 0));
    }

    #[test]
    fn request_deserializes_without_defaults() {
        let req: BatchRequest = serde_json::from_value(serde_json::json!({
            "x_field": "seed",
            "x_values": ["1", "2"],
            "y_field": "steps",
            "y_values": ["10"],
            "workflow_id": 9
        }))
        .unwrap();
        assert!(req.default_params.is_empty());
        assert!(req.validate().is_ok());
        assert_eq!(req.expand().len(), 2);
    }
}
