//! The Transition Log for workflow steps (C2). See `task_transition.rs` for
//! the append/most-recent discipline; this is the step-scoped counterpart.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{TaskerError, TaskerResult};

#[derive(Debug, Clone, FromRow)]
pub struct WorkflowStepTransition {
    pub workflow_step_transition_uuid: Uuid,
    pub workflow_step_uuid: Uuid,
    pub to_state: String,
    pub from_state: Option<String>,
    pub metadata: Option<Value>,
    pub sort_key: i32,
    pub most_recent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWorkflowStepTransition {
    pub workflow_step_uuid: Uuid,
    pub to_state: String,
    pub from_state: Option<String>,
    pub metadata: Option<Value>,
}

const UNIQUE_VIOLATION: &str = "23505";

impl WorkflowStepTransition {
    pub async fn create(
        pool: &sqlx::PgPool,
        new_transition: NewWorkflowStepTransition,
    ) -> TaskerResult<WorkflowStepTransition> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE tasker.workflow_step_transitions SET most_recent = false \
             WHERE workflow_step_uuid = $1 AND most_recent = true",
        )
        .bind(new_transition.workflow_step_uuid)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query_as::<_, WorkflowStepTransition>(
            r#"
            INSERT INTO tasker.workflow_step_transitions
                (workflow_step_transition_uuid, workflow_step_uuid, to_state, from_state, metadata, sort_key, most_recent)
            VALUES (
                $1, $2, $3, $4, $5,
                (SELECT COALESCE(MAX(sort_key), 0) + 1 FROM tasker.workflow_step_transitions WHERE workflow_step_uuid = $2),
                true
            )
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(new_transition.workflow_step_uuid)
        .bind(&new_transition.to_state)
        .bind(&new_transition.from_state)
        .bind(new_transition.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| translate_conflict(e, new_transition.workflow_step_uuid))?;

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn current_for_step(
        pool: &sqlx::PgPool,
        workflow_step_uuid: Uuid,
    ) -> Result<Option<WorkflowStepTransition>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStepTransition>(
            "SELECT * FROM tasker.workflow_step_transitions \
             WHERE workflow_step_uuid = $1 AND most_recent = true",
        )
        .bind(workflow_step_uuid)
        .fetch_optional(pool)
        .await
    }

    pub async fn history_for_step(
        pool: &sqlx::PgPool,
        workflow_step_uuid: Uuid,
    ) -> Result<Vec<WorkflowStepTransition>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStepTransition>(
            "SELECT * FROM tasker.workflow_step_transitions \
             WHERE workflow_step_uuid = $1 ORDER BY sort_key ASC",
        )
        .bind(workflow_step_uuid)
        .fetch_all(pool)
        .await
    }
}

fn translate_conflict(err: sqlx::Error, workflow_step_uuid: Uuid) -> TaskerError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return TaskerError::ConcurrencyConflict {
                entity_type: "WorkflowStep",
                entity_id: workflow_step_uuid,
            };
        }
    }
    TaskerError::Infrastructure(err)
}
