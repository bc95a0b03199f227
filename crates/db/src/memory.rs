//! In-process [`GenerationStore`].
//!
//! Rows live in a `BTreeMap` behind a `tokio::sync::RwLock`; every write
//! takes the write lock for its whole read-check-modify cycle, which gives
//! the same single-row atomicity the SQL guard provides.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use xyplot_core::generation::GenerationStatus;
use xyplot_core::types::{DbId, Timestamp};

use crate::models::generation::{
    clamp_limit, CreateGeneration, Generation, GenerationFilter, UpdateGeneration,
};
use crate::store::{rejected_update, GenerationStore, StoreError};

/// Thread-safe in-memory generation store.
///
/// Designed to be wrapped in `Arc` and shared across the application.
pub struct InMemoryGenerationStore {
    rows: RwLock<BTreeMap<DbId, Generation>>,
    next_id: AtomicI64,
}

impl InMemoryGenerationStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of rows currently stored.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl Default for InMemoryGenerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationStore for InMemoryGenerationStore {
    async fn create(&self, input: &CreateGeneration) -> Result<Generation, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let row = Generation {
            id,
            workflow_id: input.workflow_id,
            batch_id: input.batch_id,
            x_index: input.x_index,
            y_index: input.y_index,
            x_value: input.x_value.clone(),
            y_value: input.y_value.clone(),
            parameters: input.parameters.clone(),
            status_id: GenerationStatus::Pending.id(),
            result_url: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.insert(id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Generation>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list_by_ids(&self, ids: &[DbId]) -> Result<Vec<Generation>, StoreError> {
        let rows = self.rows.read().await;
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn list_recent(
        &self,
        limit: Option<i64>,
        filter: &GenerationFilter,
    ) -> Result<Vec<Generation>, StoreError> {
        let limit = clamp_limit(limit) as usize;
        let rows = self.rows.read().await;
        let mut matching: Vec<Generation> =
            rows.values().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn list_by_batch(&self, batch_id: Uuid) -> Result<Vec<Generation>, StoreError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<Generation> = rows
            .values()
            .filter(|r| r.batch_id == Some(batch_id))
            .cloned()
            .collect();
        matching.sort_by_key(|r| (r.y_index, r.x_index, r.id));
        Ok(matching)
    }

    async fn update(&self, id: DbId, patch: &UpdateGeneration) -> Result<Generation, StoreError> {
        patch.check().map_err(StoreError::InvalidUpdate)?;

        let mut rows = self.rows.write().await;
        let Some(to) = patch.status else {
            return rows.get(&id).cloned().ok_or(StoreError::NotFound(id));
        };

        let allowed = rows
            .get(&id)
            .and_then(Generation::status)
            .is_some_and(|from| from.can_transition_to(to));
        if !allowed {
            return Err(rejected_update(id, rows.get(&id), to));
        }

        let Some(row) = rows.get_mut(&id) else {
            return Err(StoreError::NotFound(id));
        };
        let now = Utc::now();
        row.status_id = to.id();
        if let Some(url) = &patch.result_url {
            row.result_url = Some(url.clone());
        }
        if let Some(message) = &patch.error_message {
            row.error_message = Some(message.clone());
        }
        if to == GenerationStatus::Running {
            row.started_at = Some(now);
        }
        if to.is_terminal() && row.completed_at.is_none() {
            row.completed_at = Some(now);
        }
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn delete_many(
        &self,
        ids: &[DbId],
        filter: &GenerationFilter,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let mut deleted = 0;
        for id in ids {
            let matches = rows.get(id).is_some_and(|r| filter.matches(r));
            if matches && rows.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn fail_stale(&self, cutoff: Timestamp, message: &str) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();
        let mut failed = 0;
        for row in rows.values_mut() {
            if row.is_terminal() || row.created_at >= cutoff {
                continue;
            }
            row.status_id = GenerationStatus::Failed.id();
            row.error_message = Some(message.to_string());
            row.completed_at.get_or_insert(now);
            row.updated_at = now;
            failed += 1;
        }
        Ok(failed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn new_generation(workflow_id: DbId) -> CreateGeneration {
        CreateGeneration {
            workflow_id,
            batch_id: None,
            x_index: None,
            y_index: None,
            x_value: None,
            y_value: None,
            parameters: serde_json::json!({}),
        }
    }

    fn batch_cell(batch_id: Uuid, x: i32, y: i32) -> CreateGeneration {
        CreateGeneration {
            batch_id: Some(batch_id),
            x_index: Some(x),
            y_index: Some(y),
            ..new_generation(1)
        }
    }

    #[tokio::test]
    async fn create_starts_pending_with_fresh_ids() {
        let store = InMemoryGenerationStore::new();
        let a = store.create(&new_generation(1)).await.unwrap();
        let b = store.create(&new_generation(1)).await.unwrap();
        assert_eq!(a.status(), Some(GenerationStatus::Pending));
        assert_ne!(a.id, b.id);
        assert!(a.started_at.is_none() && a.completed_at.is_none());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn full_lifecycle_stamps_timestamps() {
        let store = InMemoryGenerationStore::new();
        let row = store.create(&new_generation(1)).await.unwrap();

        let running = store.update(row.id, &UpdateGeneration::running()).await.unwrap();
        assert_eq!(running.status(), Some(GenerationStatus::Running));
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());

        let done = store
            .update(row.id, &UpdateGeneration::completed("https://cdn/out.png"))
            .await
            .unwrap();
        assert_eq!(done.status(), Some(GenerationStatus::Completed));
        assert_eq!(done.result_url.as_deref(), Some("https://cdn/out.png"));
        assert!(done.completed_at.is_some());
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn terminal_rows_reject_every_transition() {
        let store = InMemoryGenerationStore::new();
        let row = store.create(&new_generation(1)).await.unwrap();
        let failed = store
            .update(row.id, &UpdateGeneration::failed("no images"))
            .await
            .unwrap();
        let completed_at = failed.completed_at;
        assert!(completed_at.is_some());

        for patch in [
            UpdateGeneration::running(),
            UpdateGeneration::completed("u"),
            UpdateGeneration::failed("again"),
        ] {
            let err = store.update(row.id, &patch).await;
            assert_matches!(
                err,
                Err(StoreError::InvalidTransition { from: GenerationStatus::Failed, .. })
            );
        }

        let after = store.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(after.completed_at, completed_at);
        assert_eq!(after.error_message.as_deref(), Some("no images"));
    }

    #[tokio::test]
    async fn pending_cannot_complete_directly() {
        let store = InMemoryGenerationStore::new();
        let row = store.create(&new_generation(1)).await.unwrap();
        let err = store.update(row.id, &UpdateGeneration::completed("u")).await;
        assert_matches!(err, Err(StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn update_unknown_row_is_not_found() {
        let store = InMemoryGenerationStore::new();
        assert_matches!(
            store.update(42, &UpdateGeneration::running()).await,
            Err(StoreError::NotFound(42))
        );
        assert_matches!(
            store.update(42, &UpdateGeneration::default()).await,
            Err(StoreError::NotFound(42))
        );
    }

    #[tokio::test]
    async fn mismatched_patch_is_rejected() {
        let store = InMemoryGenerationStore::new();
        let row = store.create(&new_generation(1)).await.unwrap();
        let patch = UpdateGeneration {
            status: Some(GenerationStatus::Running),
            result_url: Some("u".into()),
            error_message: None,
        };
        assert_matches!(
            store.update(row.id, &patch).await,
            Err(StoreError::InvalidUpdate(_))
        );
    }

    #[tokio::test]
    async fn list_by_ids_preserves_request_order_and_skips_unknown() {
        let store = InMemoryGenerationStore::new();
        let a = store.create(&new_generation(1)).await.unwrap();
        let b = store.create(&new_generation(1)).await.unwrap();
        let rows = store.list_by_ids(&[b.id, 999, a.id]).await.unwrap();
        let ids: Vec<DbId> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_filtered() {
        let store = InMemoryGenerationStore::new();
        let a = store.create(&new_generation(1)).await.unwrap();
        let b = store.create(&new_generation(2)).await.unwrap();
        let c = store.create(&new_generation(1)).await.unwrap();
        store.update(c.id, &UpdateGeneration::failed("x")).await.unwrap();

        let all = store
            .list_recent(None, &GenerationFilter::default())
            .await
            .unwrap();
        let ids: Vec<DbId> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        let limited = store
            .list_recent(Some(1), &GenerationFilter::default())
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let pending_wf1 = store
            .list_recent(
                None,
                &GenerationFilter {
                    status: Some(GenerationStatus::Pending),
                    workflow_id: Some(1),
                    batch_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(pending_wf1.len(), 1);
        assert_eq!(pending_wf1[0].id, a.id);
    }

    #[tokio::test]
    async fn list_by_batch_is_row_major() {
        let store = InMemoryGenerationStore::new();
        let batch = Uuid::new_v4();
        store.create(&batch_cell(batch, 1, 1)).await.unwrap();
        store.create(&batch_cell(batch, 0, 1)).await.unwrap();
        store.create(&batch_cell(batch, 1, 0)).await.unwrap();
        store.create(&batch_cell(Uuid::new_v4(), 0, 0)).await.unwrap();

        let rows = store.list_by_batch(batch).await.unwrap();
        let positions: Vec<(Option<i32>, Option<i32>)> =
            rows.iter().map(|r| (r.x_index, r.y_index)).collect();
        assert_eq!(
            positions,
            vec![(Some(1), Some(0)), (Some(0), Some(1)), (Some(1), Some(1))]
        );
    }

    #[tokio::test]
    async fn delete_and_delete_many_with_filter() {
        let store = InMemoryGenerationStore::new();
        let a = store.create(&new_generation(1)).await.unwrap();
        let b = store.create(&new_generation(1)).await.unwrap();
        let c = store.create(&new_generation(1)).await.unwrap();
        store.update(b.id, &UpdateGeneration::failed("x")).await.unwrap();

        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());

        let only_failed = GenerationFilter {
            status: Some(GenerationStatus::Failed),
            ..Default::default()
        };
        let deleted = store.delete_many(&[b.id, c.id], &only_failed).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.find_by_id(c.id).await.unwrap().is_some());
        assert!(store.find_by_id(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_stale_only_touches_active_rows_before_cutoff() {
        let store = InMemoryGenerationStore::new();
        let pending = store.create(&new_generation(1)).await.unwrap();
        let running = store.create(&new_generation(1)).await.unwrap();
        store.update(running.id, &UpdateGeneration::running()).await.unwrap();
        let done = store.create(&new_generation(1)).await.unwrap();
        store.update(done.id, &UpdateGeneration::running()).await.unwrap();
        store
            .update(done.id, &UpdateGeneration::completed("u"))
            .await
            .unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let failed = store.fail_stale(cutoff, "interrupted").await.unwrap();
        assert_eq!(failed, 2);

        for id in [pending.id, running.id] {
            let row = store.find_by_id(id).await.unwrap().unwrap();
            assert_eq!(row.status(), Some(GenerationStatus::Failed));
            assert_eq!(row.error_message.as_deref(), Some("interrupted"));
            assert!(row.completed_at.is_some());
        }
        let row = store.find_by_id(done.id).await.unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Completed));

        let newer = store.create(&new_generation(1)).await.unwrap();
        let past = newer.created_at - chrono::Duration::seconds(60);
        assert_eq!(store.fail_stale(past, "interrupted").await.unwrap(), 0);
    }
}
