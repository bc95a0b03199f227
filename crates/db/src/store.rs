//! The generation store contract.
//!
//! [`GenerationStore`] is the only persistence surface the queue, the
//! orchestrator and the poller see. Implementations must make single-row
//! updates atomic and must enforce the lifecycle guard inside
//! [`GenerationStore::update`]: a status patch applies only when the current
//! status is an allowed predecessor of the target.

use async_trait::async_trait;
use uuid::Uuid;
use xyplot_core::generation::GenerationStatus;
use xyplot_core::types::{DbId, Timestamp};

use crate::models::generation::{CreateGeneration, Generation, GenerationFilter, UpdateGeneration};
use crate::repositories::GenerationRepo;
use crate::DbPool;

/// Errors returned by [`GenerationStore`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Generation {0} not found")]
    NotFound(DbId),

    #[error("Generation {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        id: DbId,
        from: GenerationStatus,
        to: GenerationStatus,
    },

    #[error("Invalid generation update: {0}")]
    InvalidUpdate(String),

    #[error("Generation {id} has unknown status id {status_id}")]
    UnknownStatus { id: DbId, status_id: i16 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable record of generation jobs.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Insert a new row in `pending`.
    async fn create(&self, input: &CreateGeneration) -> Result<Generation, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Generation>, StoreError>;

    /// Rows for `ids` in the order given; unknown IDs are skipped.
    async fn list_by_ids(&self, ids: &[DbId]) -> Result<Vec<Generation>, StoreError>;

    /// Newest rows first, at most `limit` (clamped, see
    /// [`clamp_limit`](crate::models::generation::clamp_limit)).
    async fn list_recent(
        &self,
        limit: Option<i64>,
        filter: &GenerationFilter,
    ) -> Result<Vec<Generation>, StoreError>;

    /// All rows of a batch, row-major by Y.
    async fn list_by_batch(&self, batch_id: Uuid) -> Result<Vec<Generation>, StoreError>;

    /// Apply a guarded partial update and return the new row.
    ///
    /// An empty patch returns the current row unchanged.
    async fn update(&self, id: DbId, patch: &UpdateGeneration) -> Result<Generation, StoreError>;

    /// Returns `true` if a row was removed.
    async fn delete(&self, id: DbId) -> Result<bool, StoreError>;

    /// Delete rows in `ids` that match `filter`; returns how many.
    async fn delete_many(&self, ids: &[DbId], filter: &GenerationFilter)
        -> Result<u64, StoreError>;

    /// Fail every `pending`/`running` row created before `cutoff` with
    /// `message`; returns how many rows changed.
    async fn fail_stale(&self, cutoff: Timestamp, message: &str) -> Result<u64, StoreError>;
}

/// Resolve the error for an update that matched no row.
pub(crate) fn rejected_update(
    id: DbId,
    current: Option<&Generation>,
    to: GenerationStatus,
) -> StoreError {
    match current {
        None => StoreError::NotFound(id),
        Some(row) => match row.status() {
            Some(from) => StoreError::InvalidTransition { id, from, to },
            None => StoreError::UnknownStatus {
                id,
                status_id: row.status_id,
            },
        },
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

/// [`GenerationStore`] backed by the `generations` table.
#[derive(Clone)]
pub struct PgGenerationStore {
    pool: DbPool,
}

impl PgGenerationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl GenerationStore for PgGenerationStore {
    async fn create(&self, input: &CreateGeneration) -> Result<Generation, StoreError> {
        Ok(GenerationRepo::create(&self.pool, input).await?)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Generation>, StoreError> {
        Ok(GenerationRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_by_ids(&self, ids: &[DbId]) -> Result<Vec<Generation>, StoreError> {
        Ok(GenerationRepo::list_by_ids(&self.pool, ids).await?)
    }

    async fn list_recent(
        &self,
        limit: Option<i64>,
        filter: &GenerationFilter,
    ) -> Result<Vec<Generation>, StoreError> {
        Ok(GenerationRepo::list_recent(&self.pool, limit, filter).await?)
    }

    async fn list_by_batch(&self, batch_id: Uuid) -> Result<Vec<Generation>, StoreError> {
        Ok(GenerationRepo::list_by_batch(&self.pool, batch_id).await?)
    }

    async fn update(&self, id: DbId, patch: &UpdateGeneration) -> Result<Generation, StoreError> {
        patch.check().map_err(StoreError::InvalidUpdate)?;

        let Some(to) = patch.status else {
            return GenerationRepo::find_by_id(&self.pool, id)
                .await?
                .ok_or(StoreError::NotFound(id));
        };

        let updated = GenerationRepo::transition(
            &self.pool,
            id,
            to,
            patch.result_url.as_deref(),
            patch.error_message.as_deref(),
        )
        .await?;

        match updated {
            Some(row) => Ok(row),
            None => {
                let current = GenerationRepo::find_by_id(&self.pool, id).await?;
                Err(rejected_update(id, current.as_ref(), to))
            }
        }
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(GenerationRepo::delete(&self.pool, id).await?)
    }

    async fn delete_many(
        &self,
        ids: &[DbId],
        filter: &GenerationFilter,
    ) -> Result<u64, StoreError> {
        Ok(GenerationRepo::delete_many(&self.pool, ids, filter).await?)
    }

    async fn fail_stale(&self, cutoff: Timestamp, message: &str) -> Result<u64, StoreError> {
        Ok(GenerationRepo::fail_stale(&self.pool, cutoff, message).await?)
    }
}
