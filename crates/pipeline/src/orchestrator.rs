//! Turns a sweep request into stored generations and queued work.

use std::sync::Arc;

use uuid::Uuid;
use xyplot_core::axis::ParameterCombination;
use xyplot_core::batch::{BatchDescriptor, BatchJob, BatchRequest};
use xyplot_core::error::CoreError;
use xyplot_core::types::DbId;
use xyplot_db::models::generation::{CellParameters, CreateGeneration, Generation, GenerationFilter};
use xyplot_db::GenerationStore;
use xyplot_events::bus::EVENT_BATCH_ENQUEUED;
use xyplot_events::{EventBus, SweepEvent};

use crate::error::PipelineError;
use crate::provider::ProviderError;
use crate::queue::{Task, TaskQueue};
use crate::runner::GenerationRunner;

/// Expands sweep requests and hands their cells to the queue.
pub struct BatchOrchestrator {
    store: Arc<dyn GenerationStore>,
    runner: GenerationRunner,
    queue: TaskQueue,
    events: Arc<EventBus>,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn GenerationStore>,
        runner: GenerationRunner,
        queue: TaskQueue,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            runner,
            queue,
            events,
        }
    }

    /// Validate, expand, store and enqueue a sweep.
    ///
    /// Every cell is pre-flighted first. When no cell passes, the request is
    /// rejected and nothing is stored. Otherwise every cell gets a row;
    /// cells that failed pre-flight are marked failed straight away and the
    /// rest are enqueued in matrix order. If storing or queueing fails part
    /// way, the rows already created for the batch are deleted.
    pub async fn enqueue_batch(&self, request: &BatchRequest) -> Result<BatchDescriptor, PipelineError> {
        request.validate()?;
        let cells = request.expand();
        if cells.is_empty() {
            return Err(CoreError::Validation("Sweep produced no combinations".into()).into());
        }

        let verdicts: Vec<Result<(), ProviderError>> = cells
            .iter()
            .map(|cell| self.runner.provider().preflight(cell))
            .collect();
        if let Some(Err(first)) = verdicts.first().filter(|_| verdicts.iter().all(Result::is_err)) {
            return Err(CoreError::Validation(format!(
                "Every combination failed pre-flight: {first}"
            ))
            .into());
        }

        let batch_id = Uuid::new_v4();
        let x_field = request.x_field.trim();
        let y_field = request.y_field.trim();

        let mut created = Vec::with_capacity(cells.len());
        let stored = self
            .store_and_enqueue(request, batch_id, cells, verdicts, &mut created)
            .await;
        let (jobs, queued, rejected) = match stored {
            Ok(stored) => stored,
            Err(e) => {
                self.discard(batch_id, &created).await;
                return Err(e);
            }
        };

        let descriptor = BatchDescriptor::from_jobs(batch_id, x_field, y_field, jobs);
        tracing::info!(
            %batch_id,
            total = descriptor.total_combinations,
            queued,
            rejected,
            "Sweep batch enqueued",
        );
        self.events.publish(
            SweepEvent::new(EVENT_BATCH_ENQUEUED)
                .with_batch(batch_id)
                .with_payload(serde_json::json!({
                    "x_field": descriptor.x_field,
                    "y_field": descriptor.y_field,
                    "total_combinations": descriptor.total_combinations,
                    "queued": queued,
                    "rejected": rejected,
                })),
        );

        Ok(descriptor)
    }

    pub async fn describe_batch(&self, batch_id: Uuid) -> Result<Option<BatchDescriptor>, PipelineError> {
        describe_batch(self.store.as_ref(), batch_id).await
    }

    /// Create a row per cell and queue the cells that passed pre-flight.
    ///
    /// Every created id is pushed onto `created` before anything else can
    /// fail, so the caller can remove a partially stored batch.
    async fn store_and_enqueue(
        &self,
        request: &BatchRequest,
        batch_id: Uuid,
        cells: Vec<ParameterCombination>,
        verdicts: Vec<Result<(), ProviderError>>,
        created: &mut Vec<DbId>,
    ) -> Result<(Vec<BatchJob>, usize, usize), PipelineError> {
        let x_field = request.x_field.trim();
        let y_field = request.y_field.trim();

        let mut jobs = Vec::with_capacity(cells.len());
        let mut tasks: Vec<Task> = Vec::with_capacity(cells.len());
        let mut rejected = 0usize;

        for (mut cell, verdict) in cells.into_iter().zip(verdicts) {
            let input =
                CreateGeneration::for_cell(request.workflow_id, batch_id, x_field, y_field, &cell)?;
            let row = self.store.create(&input).await?;
            created.push(row.id);
            cell.generation_id = Some(row.id);

            jobs.push(BatchJob {
                generation_id: row.id,
                x_index: cell.x_index,
                y_index: cell.y_index,
                x_value: cell.x_value.clone(),
                y_value: cell.y_value.clone(),
            });

            match verdict {
                Ok(()) => tasks.push(self.runner.task(row.id, Some(batch_id), cell)),
                Err(e) => {
                    self.runner.fail_preflight(row.id, Some(batch_id), &e).await?;
                    rejected += 1;
                }
            }
        }

        let queued = tasks.len();
        self.queue.enqueue(tasks).await?;
        Ok((jobs, queued, rejected))
    }

    /// Remove the rows of a batch that could not be fully stored or queued.
    async fn discard(&self, batch_id: Uuid, created: &[DbId]) {
        if created.is_empty() {
            return;
        }
        let filter = GenerationFilter {
            batch_id: Some(batch_id),
            ..Default::default()
        };
        match self.store.delete_many(created, &filter).await {
            Ok(deleted) => tracing::warn!(%batch_id, deleted, "Discarded partially stored batch"),
            Err(e) => tracing::error!(
                %batch_id,
                error = %e,
                orphaned = created.len(),
                "Failed to discard partially stored batch",
            ),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }
}

/// Rebuild a batch descriptor from its stored rows.
///
/// Returns `None` for an unknown batch.
pub async fn describe_batch(
    store: &dyn GenerationStore,
    batch_id: Uuid,
) -> Result<Option<BatchDescriptor>, PipelineError> {
    let rows = store.list_by_batch(batch_id).await?;
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let fields = CellParameters::from_row(first)?;
    let jobs = rows.iter().filter_map(job_from_row).collect();
    Ok(Some(BatchDescriptor::from_jobs(
        batch_id,
        fields.x_field,
        fields.y_field,
        jobs,
    )))
}

fn job_from_row(row: &Generation) -> Option<BatchJob> {
    Some(BatchJob {
        generation_id: row.id,
        x_index: usize::try_from(row.x_index?).ok()?,
        y_index: usize::try_from(row.y_index?).ok()?,
        x_value: row.x_value.clone()?,
        y_value: row.y_value.clone()?,
    })
}
