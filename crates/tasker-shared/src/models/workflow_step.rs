//! The `WorkflowStep` entity (SPEC_FULL.md §3).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct WorkflowStep {
    pub workflow_step_uuid: Uuid,
    pub task_uuid: Uuid,
    pub named_step_uuid: Uuid,
    pub retryable: bool,
    pub retry_limit: Option<i32>,
    pub skippable: bool,
    pub in_process: bool,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempts: Option<i32>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub backoff_request_seconds: Option<i32>,
    pub inputs: Option<Value>,
    pub results: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWorkflowStep {
    pub workflow_step_uuid: Uuid,
    pub task_uuid: Uuid,
    pub named_step_uuid: Uuid,
    pub retryable: bool,
    pub retry_limit: Option<i32>,
    pub skippable: bool,
    pub inputs: Option<Value>,
}

impl WorkflowStep {
    /// `attempts` treated as 0 when unset, per §4.3.
    pub fn attempts_or_zero(&self) -> i32 {
        self.attempts.unwrap_or(0)
    }

    /// `retry_limit` treated as the configured default when unset.
    pub fn retry_limit_or_default(&self, default_retry_limit: i32) -> i32 {
        self.retry_limit.unwrap_or(default_retry_limit)
    }

    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        workflow_step_uuid: Uuid,
    ) -> Result<Option<WorkflowStep>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStep>(
            "SELECT * FROM tasker.workflow_steps WHERE workflow_step_uuid = $1",
        )
        .bind(workflow_step_uuid)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_for_task(
        pool: &sqlx::PgPool,
        task_uuid: Uuid,
    ) -> Result<Vec<WorkflowStep>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStep>(
            "SELECT * FROM tasker.workflow_steps WHERE task_uuid = $1",
        )
        .bind(task_uuid)
        .fetch_all(pool)
        .await
    }

    /// Fetches multiple steps by id, e.g. a step's parent set for results
    /// gathering before dispatch. Missing ids are silently absent from the
    /// result, not errors.
    pub async fn find_many(
        pool: &sqlx::PgPool,
        workflow_step_uuids: &[Uuid],
    ) -> Result<Vec<WorkflowStep>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStep>(
            "SELECT * FROM tasker.workflow_steps WHERE workflow_step_uuid = ANY($1)",
        )
        .bind(workflow_step_uuids)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &sqlx::PgPool,
        new_step: NewWorkflowStep,
    ) -> Result<WorkflowStep, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStep>(
            r#"
            INSERT INTO tasker.workflow_steps
                (workflow_step_uuid, task_uuid, named_step_uuid, retryable,
                 retry_limit, skippable, inputs)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new_step.workflow_step_uuid)
        .bind(new_step.task_uuid)
        .bind(new_step.named_step_uuid)
        .bind(new_step.retryable)
        .bind(new_step.retry_limit)
        .bind(new_step.skippable)
        .bind(new_step.inputs)
        .fetch_one(pool)
        .await
    }

    /// Conditional claim (CAS): flips `in_process` false -> true. Returns
    /// `true` if this call won the claim, `false` if another worker already
    /// holds it. Never errors on a lost race — that is normal contention.
    pub async fn try_claim(
        pool: &sqlx::PgPool,
        workflow_step_uuid: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasker.workflow_steps SET in_process = true, updated_at = now() \
             WHERE workflow_step_uuid = $1 AND in_process = false",
        )
        .bind(workflow_step_uuid)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn release_claim(
        pool: &sqlx::PgPool,
        workflow_step_uuid: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasker.workflow_steps SET in_process = false, updated_at = now() \
             WHERE workflow_step_uuid = $1",
        )
        .bind(workflow_step_uuid)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Records a successful handler invocation: increments attempts, marks
    /// processed, clears in_process. Does not write the transition row —
    /// callers pair this with `WorkflowStepTransition::create`.
    pub async fn record_success(
        pool: &sqlx::PgPool,
        workflow_step_uuid: Uuid,
        results: Option<Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tasker.workflow_steps
            SET results = $2,
                attempts = COALESCE(attempts, 0) + 1,
                processed = true,
                processed_at = now(),
                in_process = false,
                updated_at = now()
            WHERE workflow_step_uuid = $1
            "#,
        )
        .bind(workflow_step_uuid)
        .bind(results)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Records a failed handler invocation: increments attempts, stores the
    /// optional explicit backoff, clears in_process. Leaves `processed` false.
    pub async fn record_failure(
        pool: &sqlx::PgPool,
        workflow_step_uuid: Uuid,
        backoff_request_seconds: Option<i32>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tasker.workflow_steps
            SET attempts = COALESCE(attempts, 0) + 1,
                last_attempted_at = now(),
                backoff_request_seconds = $2,
                in_process = false,
                updated_at = now()
            WHERE workflow_step_uuid = $1
            "#,
        )
        .bind(workflow_step_uuid)
        .bind(backoff_request_seconds)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Manual operator override of the `retryable` flag (e.g. flipping a
    /// permanently-failed step back to eligible, per §8's boundary case).
    pub async fn set_retryable(
        pool: &sqlx::PgPool,
        workflow_step_uuid: Uuid,
        retryable: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasker.workflow_steps SET retryable = $2, updated_at = now() \
             WHERE workflow_step_uuid = $1",
        )
        .bind(workflow_step_uuid)
        .bind(retryable)
        .execute(pool)
        .await?;
        Ok(())
    }
}
