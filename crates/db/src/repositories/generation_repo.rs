//! Repository for the `generations` table.
//!
//! Status transitions are guarded in SQL: an update only matches rows whose
//! current status is an allowed predecessor of the target status, so a
//! terminal row can never be moved again even under concurrent writers.

use sqlx::PgPool;
use uuid::Uuid;
use xyplot_core::types::{DbId, Timestamp};

use crate::models::generation::{clamp_limit, CreateGeneration, Generation, GenerationFilter};
use crate::models::status::{predecessor_ids, GenerationStatus, ACTIVE_STATUSES};

/// Column list for `generations` queries.
const COLUMNS: &str = "\
    id, workflow_id, batch_id, x_index, y_index, x_value, y_value, \
    parameters, status_id, result_url, error_message, \
    started_at, completed_at, created_at, updated_at";

/// Provides CRUD operations and guarded transitions for generations.
pub struct GenerationRepo;

impl GenerationRepo {
    /// Insert a new pending generation.
    pub async fn create(pool: &PgPool, input: &CreateGeneration) -> Result<Generation, sqlx::Error> {
        let query = format!(
            "INSERT INTO generations \
                 (workflow_id, batch_id, x_index, y_index, x_value, y_value, parameters, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(input.workflow_id)
            .bind(input.batch_id)
            .bind(input.x_index)
            .bind(input.y_index)
            .bind(&input.x_value)
            .bind(&input.y_value)
            .bind(&input.parameters)
            .bind(GenerationStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find a generation by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Generation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generations WHERE id = $1");
        sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Fetch several generations, returned in the order of `ids`.
    /// Unknown IDs are skipped.
    pub async fn list_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<Generation>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE id = ANY($1) \
             ORDER BY array_position($1, id)"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// List the newest generations matching `filter`, newest first.
    pub async fn list_recent(
        pool: &PgPool,
        limit: Option<i64>,
        filter: &GenerationFilter,
    ) -> Result<Vec<Generation>, sqlx::Error> {
        let limit = clamp_limit(limit);

        // Build the WHERE clause and track the next bind parameter index.
        let (where_clause, bind_idx) = filter_clause(filter, 1);

        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx}"
        );

        let mut q = sqlx::query_as::<_, Generation>(&query);
        if let Some(status) = filter.status {
            q = q.bind(status.id());
        }
        if let Some(workflow_id) = filter.workflow_id {
            q = q.bind(workflow_id);
        }
        if let Some(batch_id) = filter.batch_id {
            q = q.bind(batch_id);
        }
        q.bind(limit).fetch_all(pool).await
    }

    /// All rows of a batch, row-major by Y.
    pub async fn list_by_batch(pool: &PgPool, batch_id: Uuid) -> Result<Vec<Generation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE batch_id = $1 \
             ORDER BY y_index ASC, x_index ASC, id ASC"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    /// Move a generation into `to` if its current status allows it.
    ///
    /// Stamps `started_at` when entering `running` and `completed_at` (once)
    /// when entering a terminal status. Returns `None` when the row does not
    /// exist or its current status is not an allowed predecessor.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        to: GenerationStatus,
        result_url: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Option<Generation>, sqlx::Error> {
        let query = format!(
            "UPDATE generations \
             SET status_id = $2, \
                 result_url = COALESCE($3, result_url), \
                 error_message = COALESCE($4, error_message), \
                 started_at = CASE WHEN $5 THEN NOW() ELSE started_at END, \
                 completed_at = CASE WHEN $6 THEN COALESCE(completed_at, NOW()) ELSE completed_at END, \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .bind(to.id())
            .bind(result_url)
            .bind(error_message)
            .bind(to == GenerationStatus::Running)
            .bind(to.is_terminal())
            .bind(predecessor_ids(to))
            .fetch_optional(pool)
            .await
    }

    /// Delete a generation. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM generations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every generation in `ids` that also matches `filter`.
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_many(
        pool: &PgPool,
        ids: &[DbId],
        filter: &GenerationFilter,
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let (filter_clause, _) = filter_clause(filter, 2);
        let extra = filter_clause.replacen("WHERE", "AND", 1);
        let query = format!("DELETE FROM generations WHERE id = ANY($1) {extra}");

        let mut q = sqlx::query(&query).bind(ids);
        if let Some(status) = filter.status {
            q = q.bind(status.id());
        }
        if let Some(workflow_id) = filter.workflow_id {
            q = q.bind(workflow_id);
        }
        if let Some(batch_id) = filter.batch_id {
            q = q.bind(batch_id);
        }
        let result = q.execute(pool).await?;
        Ok(result.rows_affected())
    }

    /// Fail every pending or running generation created before `cutoff`.
    ///
    /// Returns the number of rows updated.
    pub async fn fail_stale(
        pool: &PgPool,
        cutoff: Timestamp,
        message: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $1, error_message = $2, \
                 completed_at = COALESCE(completed_at, NOW()), updated_at = NOW() \
             WHERE status_id = ANY($3) AND created_at < $4",
        )
        .bind(GenerationStatus::Failed.id())
        .bind(message)
        .bind(&ACTIVE_STATUSES[..])
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Build `WHERE ...` for `filter`, numbering binds from `first_idx`.
///
/// Returns the clause (empty when the filter is empty) and the next free
/// bind index. Binds must be applied in the order status, workflow, batch.
fn filter_clause(filter: &GenerationFilter, first_idx: u32) -> (String, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = first_idx;

    if filter.status.is_some() {
        conditions.push(format!("status_id = ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.workflow_id.is_some() {
        conditions.push(format!("workflow_id = ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.batch_id.is_some() {
        conditions.push(format!("batch_id = ${bind_idx}"));
        bind_idx += 1;
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, bind_idx)
}
