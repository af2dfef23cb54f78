//! The `Task` entity (SPEC_FULL.md §3).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Task {
    pub task_uuid: Uuid,
    pub named_task_uuid: Uuid,
    pub context: Option<Value>,
    pub identity_hash: String,
    pub complete: bool,
    pub initiator: Option<String>,
    pub source_system: Option<String>,
    pub reason: Option<String>,
    pub tags: Option<Value>,
    pub bypass_steps: Option<Value>,
    pub correlation_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new task row. `task_uuid` and `correlation_id`
/// are minted by the caller (UUIDv7) so they are known before the insert.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_uuid: Uuid,
    pub named_task_uuid: Uuid,
    pub context: Option<Value>,
    pub identity_hash: String,
    pub initiator: Option<String>,
    pub source_system: Option<String>,
    pub reason: Option<String>,
    pub tags: Option<Value>,
    pub bypass_steps: Option<Value>,
    pub correlation_id: Uuid,
}

impl Task {
    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        task_uuid: Uuid,
    ) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasker.tasks WHERE task_uuid = $1")
            .bind(task_uuid)
            .fetch_optional(pool)
            .await
    }

    /// Looks up a non-terminal task by identity hash for submission dedup.
    /// "Non-terminal" means the task's most-recent transition is not one of
    /// `complete | error | cancelled`.
    pub async fn find_active_by_identity_hash(
        pool: &sqlx::PgPool,
        identity_hash: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT t.* FROM tasker.tasks t
            LEFT JOIN tasker.task_transitions tt
                ON tt.task_uuid = t.task_uuid AND tt.most_recent
            WHERE t.identity_hash = $1
              AND COALESCE(tt.to_state, 'pending') NOT IN ('complete', 'error', 'cancelled')
            "#,
        )
        .bind(identity_hash)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(pool: &sqlx::PgPool, new_task: NewTask) -> Result<Task, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasker.tasks
                (task_uuid, named_task_uuid, context, identity_hash, initiator,
                 source_system, reason, tags, bypass_steps, correlation_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(new_task.task_uuid)
        .bind(new_task.named_task_uuid)
        .bind(new_task.context)
        .bind(new_task.identity_hash)
        .bind(new_task.initiator)
        .bind(new_task.source_system)
        .bind(new_task.reason)
        .bind(new_task.tags)
        .bind(new_task.bypass_steps)
        .bind(new_task.correlation_id)
        .fetch_one(pool)
        .await
    }

    /// Mirrors the `complete` flag onto the row; called by the state machine
    /// alongside (never instead of) writing a transition.
    pub async fn mark_complete(
        pool: &sqlx::PgPool,
        task_uuid: Uuid,
        complete: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tasker.tasks SET complete = $2, updated_at = now() WHERE task_uuid = $1")
            .bind(task_uuid)
            .bind(complete)
            .execute(pool)
            .await?;
        Ok(())
    }
}
