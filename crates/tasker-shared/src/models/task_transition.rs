//! The Transition Log for tasks (C2).
//!
//! `create` is the only write path: it atomically clears the previous
//! `most_recent` row and inserts the new one inside a single transaction.
//! The partial unique index `ux_task_transitions_most_recent` is what turns a
//! lost race into a `unique_violation` SQLSTATE rather than two "current"
//! rows; the caller maps that into `TaskerError::ConcurrencyConflict`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{TaskerError, TaskerResult};

#[derive(Debug, Clone, FromRow)]
pub struct TaskTransition {
    pub task_transition_uuid: Uuid,
    pub task_uuid: Uuid,
    pub to_state: String,
    pub from_state: Option<String>,
    pub metadata: Option<Value>,
    pub sort_key: i32,
    pub most_recent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTaskTransition {
    pub task_uuid: Uuid,
    pub to_state: String,
    pub from_state: Option<String>,
    pub metadata: Option<Value>,
}

const UNIQUE_VIOLATION: &str = "23505";

impl TaskTransition {
    pub async fn create(
        pool: &sqlx::PgPool,
        new_transition: NewTaskTransition,
    ) -> TaskerResult<TaskTransition> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE tasker.task_transitions SET most_recent = false \
             WHERE task_uuid = $1 AND most_recent = true",
        )
        .bind(new_transition.task_uuid)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query_as::<_, TaskTransition>(
            r#"
            INSERT INTO tasker.task_transitions
                (task_transition_uuid, task_uuid, to_state, from_state, metadata, sort_key, most_recent)
            VALUES (
                $1, $2, $3, $4, $5,
                (SELECT COALESCE(MAX(sort_key), 0) + 1 FROM tasker.task_transitions WHERE task_uuid = $2),
                true
            )
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(new_transition.task_uuid)
        .bind(&new_transition.to_state)
        .bind(&new_transition.from_state)
        .bind(new_transition.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| translate_conflict(e, new_transition.task_uuid))?;

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn current_for_task(
        pool: &sqlx::PgPool,
        task_uuid: Uuid,
    ) -> Result<Option<TaskTransition>, sqlx::Error> {
        sqlx::query_as::<_, TaskTransition>(
            "SELECT * FROM tasker.task_transitions WHERE task_uuid = $1 AND most_recent = true",
        )
        .bind(task_uuid)
        .fetch_optional(pool)
        .await
    }

    pub async fn history_for_task(
        pool: &sqlx::PgPool,
        task_uuid: Uuid,
    ) -> Result<Vec<TaskTransition>, sqlx::Error> {
        sqlx::query_as::<_, TaskTransition>(
            "SELECT * FROM tasker.task_transitions WHERE task_uuid = $1 ORDER BY sort_key ASC",
        )
        .bind(task_uuid)
        .fetch_all(pool)
        .await
    }
}

fn translate_conflict(err: sqlx::Error, task_uuid: Uuid) -> TaskerError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return TaskerError::ConcurrencyConflict {
                entity_type: "Task",
                entity_id: task_uuid,
            };
        }
    }
    TaskerError::Infrastructure(err)
}
