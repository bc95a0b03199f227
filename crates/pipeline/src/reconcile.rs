//! Failing generations that will never finish.
//!
//! The queue is in-memory, so rows left `pending` or `running` by a previous
//! process have no task behind them. [`fail_interrupted`] closes those out
//! when the process that owns the queue starts. Rows created after that
//! point belong to the live queue and are left alone, however long they
//! wait; provider timeouts are the adapter's business.

use xyplot_core::types::Timestamp;
use xyplot_db::{GenerationStore, StoreError};

/// Error recorded on rows orphaned by a restart.
pub const INTERRUPTED_MESSAGE: &str =
    "Interrupted: process restarted before the generation finished";

/// Fail every active row created before `started_at`.
pub async fn fail_interrupted(
    store: &dyn GenerationStore,
    started_at: Timestamp,
) -> Result<u64, StoreError> {
    let failed = store.fail_stale(started_at, INTERRUPTED_MESSAGE).await?;
    if failed > 0 {
        tracing::warn!(failed, "Failed generations interrupted by a restart");
    } else {
        tracing::debug!("No interrupted generations found");
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use xyplot_core::generation::GenerationStatus;
    use xyplot_db::models::generation::{CreateGeneration, UpdateGeneration};
    use xyplot_db::InMemoryGenerationStore;

    use super::*;

    fn input() -> CreateGeneration {
        CreateGeneration {
            workflow_id: 1,
            batch_id: None,
            x_index: None,
            y_index: None,
            x_value: None,
            y_value: None,
            parameters: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn startup_sweep_fails_only_older_active_rows() {
        let store = InMemoryGenerationStore::new();
        let pending = store.create(&input()).await.unwrap();
        let running = store.create(&input()).await.unwrap();
        store.update(running.id, &UpdateGeneration::running()).await.unwrap();
        let done = store.create(&input()).await.unwrap();
        store
            .update(done.id, &UpdateGeneration::failed("earlier"))
            .await
            .unwrap();

        let boot = Utc::now() + chrono::Duration::seconds(1);
        let failed = fail_interrupted(&store, boot).await.unwrap();
        assert_eq!(failed, 2);

        for id in [pending.id, running.id] {
            let row = store.find_by_id(id).await.unwrap().unwrap();
            assert_eq!(row.status(), Some(GenerationStatus::Failed));
            assert_eq!(row.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        }
        let untouched = store.find_by_id(done.id).await.unwrap().unwrap();
        assert_eq!(untouched.error_message.as_deref(), Some("earlier"));
    }

    #[tokio::test]
    async fn rows_created_after_startup_are_left_to_the_queue() {
        let store = InMemoryGenerationStore::new();
        let boot = Utc::now() - chrono::Duration::seconds(1);
        let live = store.create(&input()).await.unwrap();

        assert_eq!(fail_interrupted(&store, boot).await.unwrap(), 0);
        let row = store.find_by_id(live.id).await.unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Pending));
    }
}
