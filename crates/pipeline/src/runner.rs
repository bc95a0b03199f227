//! Runs a single generation through its lifecycle.
//!
//! `pending -> running -> completed | failed`, recorded through the
//! [`GenerationStore`] and announced on the [`EventBus`]. Provider failures
//! are captured on the row; store failures are logged and published as
//! `generation.errored` since the row itself can no longer be trusted.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use uuid::Uuid;
use xyplot_core::axis::ParameterCombination;
use xyplot_core::generation::GenerationStatus;
use xyplot_core::types::DbId;
use xyplot_db::models::generation::{Generation, UpdateGeneration};
use xyplot_db::{GenerationStore, StoreError};
use xyplot_events::bus::{
    EVENT_GENERATION_COMPLETED, EVENT_GENERATION_ERRORED, EVENT_GENERATION_FAILED,
    EVENT_GENERATION_RUNNING,
};
use xyplot_events::{EventBus, SweepEvent};

use crate::provider::{ProviderAdapter, ProviderError};
use crate::queue::Task;

/// Executes generation jobs against one provider.
#[derive(Clone)]
pub struct GenerationRunner {
    store: Arc<dyn GenerationStore>,
    provider: Arc<dyn ProviderAdapter>,
    events: Arc<EventBus>,
}

impl GenerationRunner {
    pub fn new(
        store: Arc<dyn GenerationStore>,
        provider: Arc<dyn ProviderAdapter>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            provider,
            events,
        }
    }

    pub fn provider(&self) -> &dyn ProviderAdapter {
        self.provider.as_ref()
    }

    /// Wrap [`run`](Self::run) as a queue task.
    pub fn task(&self, generation_id: DbId, batch_id: Option<Uuid>, job: ParameterCombination) -> Task {
        let runner = self.clone();
        Box::pin(async move {
            runner.run(generation_id, batch_id, job).await;
        })
    }

    /// Drive one generation to a terminal status.
    ///
    /// Returns the status recorded, or `None` when the store rejected an
    /// update and the outcome could not be recorded.
    pub async fn run(
        &self,
        generation_id: DbId,
        batch_id: Option<Uuid>,
        job: ParameterCombination,
    ) -> Option<GenerationStatus> {
        match self.execute(generation_id, batch_id, &job).await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::error!(
                    generation_id,
                    provider = self.provider.name(),
                    error = %e,
                    "Generation task could not record its state",
                );
                self.publish(
                    EVENT_GENERATION_ERRORED,
                    generation_id,
                    batch_id,
                    serde_json::json!({ "error": e.to_string() }),
                );
                None
            }
        }
    }

    /// Record a pre-flight rejection without ever marking the row running.
    pub async fn fail_preflight(
        &self,
        generation_id: DbId,
        batch_id: Option<Uuid>,
        error: &ProviderError,
    ) -> Result<Generation, StoreError> {
        self.record_failure(generation_id, batch_id, error).await
    }

    async fn execute(
        &self,
        generation_id: DbId,
        batch_id: Option<Uuid>,
        job: &ParameterCombination,
    ) -> Result<GenerationStatus, StoreError> {
        if let Err(e) = self.provider.preflight(job) {
            self.record_failure(generation_id, batch_id, &e).await?;
            return Ok(GenerationStatus::Failed);
        }

        self.store
            .update(generation_id, &UpdateGeneration::running())
            .await?;
        self.publish(
            EVENT_GENERATION_RUNNING,
            generation_id,
            batch_id,
            serde_json::json!({
                "x_index": job.x_index,
                "y_index": job.y_index,
            }),
        );
        tracing::info!(
            generation_id,
            provider = self.provider.name(),
            x_index = job.x_index,
            y_index = job.y_index,
            "Generation started",
        );

        let outcome = AssertUnwindSafe(self.provider.generate(job))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ProviderError::Request("provider panicked".into())));

        match outcome {
            Ok(url) if url.trim().is_empty() => {
                self.record_failure(generation_id, batch_id, &ProviderError::EmptyResult)
                    .await?;
                Ok(GenerationStatus::Failed)
            }
            Ok(url) => {
                self.store
                    .update(generation_id, &UpdateGeneration::completed(url.clone()))
                    .await?;
                tracing::info!(generation_id, result_url = %url, "Generation completed");
                self.publish(
                    EVENT_GENERATION_COMPLETED,
                    generation_id,
                    batch_id,
                    serde_json::json!({ "result_url": url }),
                );
                Ok(GenerationStatus::Completed)
            }
            Err(e) => {
                self.record_failure(generation_id, batch_id, &e).await?;
                Ok(GenerationStatus::Failed)
            }
        }
    }

    async fn record_failure(
        &self,
        generation_id: DbId,
        batch_id: Option<Uuid>,
        error: &ProviderError,
    ) -> Result<Generation, StoreError> {
        let message = error.to_string();
        let row = self
            .store
            .update(generation_id, &UpdateGeneration::failed(message.clone()))
            .await?;
        tracing::warn!(generation_id, error = %message, "Generation failed");
        self.publish(
            EVENT_GENERATION_FAILED,
            generation_id,
            batch_id,
            serde_json::json!({ "error": message }),
        );
        Ok(row)
    }

    fn publish(
        &self,
        event_type: &str,
        generation_id: DbId,
        batch_id: Option<Uuid>,
        payload: serde_json::Value,
    ) {
        let mut event = SweepEvent::new(event_type)
            .with_generation(generation_id)
            .with_payload(payload);
        if let Some(batch_id) = batch_id {
            event = event.with_batch(batch_id);
        }
        self.events.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use xyplot_core::generation::require_prompt;
    use xyplot_core::params::ParamValue;
    use xyplot_db::models::generation::CreateGeneration;
    use xyplot_db::InMemoryGenerationStore;

    use super::*;

    struct Scripted {
        result: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl ProviderAdapter for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn preflight(&self, job: &ParameterCombination) -> Result<(), ProviderError> {
            require_prompt(job)?;
            Ok(())
        }

        async fn generate(&self, _job: &ParameterCombination) -> Result<String, ProviderError> {
            match self.result {
                Ok(url) => Ok(url.to_string()),
                Err(msg) => Err(ProviderError::Request(msg.to_string())),
            }
        }
    }

    fn job(prompt: &str) -> ParameterCombination {
        let mut other_params = xyplot_core::params::ParamMap::new();
        other_params.insert("prompt".into(), ParamValue::Text(prompt.into()));
        ParameterCombination {
            x_index: 1,
            y_index: 0,
            x_value: "a".into(),
            y_value: "b".into(),
            images: Vec::new(),
            other_params,
            generation_id: None,
        }
    }

    async fn setup(
        result: Result<&'static str, &'static str>,
    ) -> (GenerationRunner, Arc<InMemoryGenerationStore>, Arc<EventBus>, DbId) {
        let store = Arc::new(InMemoryGenerationStore::new());
        let events = Arc::new(EventBus::default());
        let row = store
            .create(&CreateGeneration {
                workflow_id: 1,
                batch_id: None,
                x_index: None,
                y_index: None,
                x_value: None,
                y_value: None,
                parameters: serde_json::json!({}),
            })
            .await
            .unwrap();
        let runner = GenerationRunner::new(
            store.clone(),
            Arc::new(Scripted { result }),
            Arc::clone(&events),
        );
        (runner, store, events, row.id)
    }

    #[tokio::test]
    async fn success_records_url_and_publishes_events() {
        let (runner, store, events, id) = setup(Ok("https://cdn/1.png")).await;
        let mut rx = events.subscribe();

        let status = runner.run(id, None, job("a cat")).await;
        assert_eq!(status, Some(GenerationStatus::Completed));

        let row = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(row.result_url.as_deref(), Some("https://cdn/1.png"));
        assert!(row.started_at.is_some());
        assert!(row.completed_at.is_some());

        assert_eq!(rx.recv().await.unwrap().event_type, EVENT_GENERATION_RUNNING);
        assert_eq!(rx.recv().await.unwrap().event_type, EVENT_GENERATION_COMPLETED);
    }

    #[tokio::test]
    async fn provider_error_is_stored_on_the_row() {
        let (runner, store, _events, id) = setup(Err("HTTP 503")).await;

        let status = runner.run(id, None, job("a cat")).await;
        assert_eq!(status, Some(GenerationStatus::Failed));

        let row = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(
            row.error_message.as_deref(),
            Some("Provider request failed: HTTP 503")
        );
        assert!(row.started_at.is_some());
    }

    #[tokio::test]
    async fn preflight_failure_never_marks_running() {
        let (runner, store, _events, id) = setup(Ok("https://cdn/1.png")).await;

        let status = runner.run(id, None, job("   ")).await;
        assert_eq!(status, Some(GenerationStatus::Failed));

        let row = store.find_by_id(id).await.unwrap().unwrap();
        assert!(row.started_at.is_none());
        assert_eq!(
            row.error_message.as_deref(),
            Some("Pre-flight check failed: A non-empty prompt is required")
        );
    }

    #[tokio::test]
    async fn store_rejection_is_published_as_errored() {
        let (runner, store, events, id) = setup(Ok("https://cdn/1.png")).await;
        store
            .update(id, &UpdateGeneration::failed("cancelled"))
            .await
            .unwrap();
        let mut rx = events.subscribe();

        assert_eq!(runner.run(id, None, job("a cat")).await, None);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EVENT_GENERATION_ERRORED);
        assert_matches!(event.generation_id, Some(g) if g == id);

        let row = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(row.error_message.as_deref(), Some("cancelled"));
    }
}
