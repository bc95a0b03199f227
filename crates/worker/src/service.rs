//! The assembled sweep pipeline for one process.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use xyplot_core::batch::{BatchDescriptor, BatchRequest};
use xyplot_db::GenerationStore;
use xyplot_events::EventBus;
use xyplot_pipeline::{
    reconcile, BatchOrchestrator, GenerationRunner, PipelineError, ProviderAdapter, QueueStatus,
    TaskQueue,
};
use xyplot_poller::{GenerationWatcher, PollingCoordinator};

use crate::config::WorkerConfig;
use crate::event_log;

/// How long shutdown waits for each background task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns every long-lived piece of the pipeline.
///
/// Constructed explicitly and shared by reference or `Arc`; there is no
/// process-global instance.
pub struct SweepService {
    store: Arc<dyn GenerationStore>,
    events: Arc<EventBus>,
    orchestrator: BatchOrchestrator,
    coordinator: PollingCoordinator,
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl SweepService {
    /// Fail rows left behind by a previous process, then start the queue and
    /// the event log.
    ///
    /// Only rows created before this call are reconciled. Everything created
    /// afterwards is owned by this service's queue and is never timed out.
    pub async fn start(
        config: &WorkerConfig,
        store: Arc<dyn GenerationStore>,
        provider: Arc<dyn ProviderAdapter>,
    ) -> anyhow::Result<Self> {
        let started_at = chrono::Utc::now();
        reconcile::fail_interrupted(store.as_ref(), started_at).await?;

        let cancel = CancellationToken::new();
        let events = Arc::new(EventBus::default());
        let mut handles = Vec::new();

        let (queue, queue_handle) = TaskQueue::spawn(config.queue.clone(), cancel.child_token());
        handles.push(("task queue", queue_handle));

        handles.push(("event log", tokio::spawn(event_log::run(events.subscribe()))));

        tracing::info!(provider = provider.name(), "Sweep service started");

        let runner = GenerationRunner::new(Arc::clone(&store), provider, Arc::clone(&events));
        let orchestrator =
            BatchOrchestrator::new(Arc::clone(&store), runner, queue, Arc::clone(&events));

        Ok(Self {
            store,
            events,
            orchestrator,
            coordinator: PollingCoordinator::new(config.poller),
            cancel,
            handles,
        })
    }

    pub async fn enqueue_batch(&self, request: &BatchRequest) -> Result<BatchDescriptor, PipelineError> {
        self.orchestrator.enqueue_batch(request).await
    }

    pub async fn describe_batch(&self, batch_id: Uuid) -> Result<Option<BatchDescriptor>, PipelineError> {
        self.orchestrator.describe_batch(batch_id).await
    }

    /// Follow every generation of a batch through the shared coordinator.
    pub async fn watch_batch(&self, descriptor: &BatchDescriptor) -> GenerationWatcher {
        GenerationWatcher::start(
            &self.coordinator,
            Arc::clone(&self.store),
            descriptor.generation_ids(),
        )
        .await
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.orchestrator.queue().status()
    }

    pub fn store(&self) -> &Arc<dyn GenerationStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn coordinator(&self) -> &PollingCoordinator {
        &self.coordinator
    }

    /// Stop background work. Tasks already handed to the provider finish;
    /// queued tasks are dropped and their rows are failed by the next
    /// startup sweep.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let Self {
            events, handles, orchestrator, ..
        } = self;
        // The event log stops once the last bus handle is gone.
        drop(orchestrator);
        drop(events);

        for (name, handle) in handles {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(_) => tracing::info!(task = name, "Background task stopped"),
                Err(_) => tracing::warn!(task = name, "Background task did not stop in time"),
            }
        }
        tracing::info!("Sweep service shut down");
    }
}
