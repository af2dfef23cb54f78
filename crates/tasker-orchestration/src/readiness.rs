//! Readiness Oracle (C3).
//!
//! Both call modes execute the same CTE against `workflow_steps`,
//! `workflow_step_edges`, and `workflow_step_transitions WHERE most_recent`,
//! folding dependency satisfaction, the retry ladder, and the backoff gate
//! into one round trip per task. The logic lives here as owned SQL text, not
//! as a literal database view or duplicated Rust arithmetic.

use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::error::TaskerResult;
use tasker_shared::models::StepReadinessStatus;

const READINESS_QUERY: &str = r#"
WITH parent_counts AS (
    SELECT
        e.to_step_uuid AS workflow_step_uuid,
        COUNT(*) AS total_parents,
        COUNT(*) FILTER (WHERE pt.to_state IN ('complete', 'resolved_manually')) AS completed_parents
    FROM tasker.workflow_step_edges e
    LEFT JOIN tasker.workflow_step_transitions pt
        ON pt.workflow_step_uuid = e.from_step_uuid AND pt.most_recent
    WHERE e.task_uuid = $1
    GROUP BY e.to_step_uuid
),
step_state AS (
    SELECT
        ws.workflow_step_uuid,
        ws.task_uuid,
        COALESCE(st.to_state, 'pending') AS current_state,
        ws.in_process,
        COALESCE(ws.attempts, 0) AS attempts,
        COALESCE(ws.retry_limit, $2) AS retry_limit,
        COALESCE(ws.retryable, $3) AS retryable,
        ws.backoff_request_seconds,
        ws.last_attempted_at,
        COALESCE(pc.total_parents, 0) AS total_parents,
        COALESCE(pc.completed_parents, 0) AS completed_parents
    FROM tasker.workflow_steps ws
    LEFT JOIN tasker.workflow_step_transitions st
        ON st.workflow_step_uuid = ws.workflow_step_uuid AND st.most_recent
    LEFT JOIN parent_counts pc ON pc.workflow_step_uuid = ws.workflow_step_uuid
    WHERE ws.task_uuid = $1 AND ws.processed = false
)
SELECT
    workflow_step_uuid,
    task_uuid,
    current_state,
    in_process,
    (total_parents = 0 OR completed_parents = total_parents) AS dependencies_satisfied,
    CASE
        WHEN attempts >= retry_limit THEN false
        WHEN attempts > 0 AND retryable = false THEN false
        WHEN last_attempted_at IS NULL AND backoff_request_seconds IS NULL THEN true
        WHEN backoff_request_seconds IS NOT NULL
            AND last_attempted_at + make_interval(secs => backoff_request_seconds) <= now() THEN true
        WHEN backoff_request_seconds IS NULL
            AND last_attempted_at + make_interval(secs => LEAST(POWER(2, GREATEST(1, attempts))::int, $4)) <= now()
            THEN true
        ELSE false
    END AS retry_eligible,
    CASE WHEN attempts > 0 THEN last_attempted_at ELSE NULL END AS last_failure_at,
    CASE
        WHEN attempts >= retry_limit THEN NULL
        WHEN attempts > 0 AND retryable = false THEN NULL
        WHEN last_attempted_at IS NULL AND backoff_request_seconds IS NULL THEN NULL
        WHEN backoff_request_seconds IS NOT NULL
            THEN last_attempted_at + make_interval(secs => backoff_request_seconds)
        ELSE last_attempted_at + make_interval(secs => LEAST(POWER(2, GREATEST(1, attempts))::int, $4))
    END AS next_retry_at,
    total_parents,
    completed_parents,
    attempts,
    retry_limit,
    backoff_request_seconds,
    last_attempted_at
FROM step_state
"#;

/// Row shape produced by `READINESS_QUERY` before the `ready_for_execution`
/// column (computed in Rust below, since it folds `current_state`,
/// `in_process` (`processed` is already filtered out by the CTE's `WHERE`),
/// `dependencies_satisfied`, and `retry_eligible` together; see §4.3
/// conjunction).
#[derive(sqlx::FromRow)]
struct ReadinessRow {
    workflow_step_uuid: Uuid,
    task_uuid: Uuid,
    current_state: String,
    in_process: bool,
    dependencies_satisfied: bool,
    retry_eligible: bool,
    last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
    next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    total_parents: i64,
    completed_parents: i64,
    attempts: i32,
    retry_limit: i32,
    backoff_request_seconds: Option<i32>,
    last_attempted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ReadinessRow {
    fn into_status(self) -> StepReadinessStatus {
        let ready_for_execution = matches!(self.current_state.as_str(), "pending" | "error")
            && !self.in_process
            && self.dependencies_satisfied
            && self.retry_eligible;

        StepReadinessStatus {
            workflow_step_uuid: self.workflow_step_uuid,
            task_uuid: self.task_uuid,
            current_state: self.current_state,
            in_process: self.in_process,
            dependencies_satisfied: self.dependencies_satisfied,
            retry_eligible: self.retry_eligible,
            ready_for_execution,
            last_failure_at: self.last_failure_at,
            next_retry_at: self.next_retry_at,
            total_parents: self.total_parents,
            completed_parents: self.completed_parents,
            attempts: self.attempts,
            retry_limit: self.retry_limit,
            backoff_request_seconds: self.backoff_request_seconds,
            last_attempted_at: self.last_attempted_at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessDefaults {
    pub default_retry_limit: i32,
    pub default_retryable: bool,
    pub backoff_cap_seconds: i64,
}

pub struct ReadinessOracle<'a> {
    pool: &'a PgPool,
    defaults: ReadinessDefaults,
}

impl<'a> ReadinessOracle<'a> {
    pub fn new(pool: &'a PgPool, defaults: ReadinessDefaults) -> Self {
        Self { pool, defaults }
    }

    /// Readiness for every unprocessed step of one task. `step_ids`, when
    /// non-empty, restricts the result to that subset (still computed over
    /// the full task so dependency counts stay correct).
    pub async fn readiness_for(
        &self,
        task_uuid: Uuid,
        step_ids: Option<&[Uuid]>,
    ) -> TaskerResult<Vec<StepReadinessStatus>> {
        let rows: Vec<ReadinessRow> = sqlx::query_as(READINESS_QUERY)
            .bind(task_uuid)
            .bind(self.defaults.default_retry_limit)
            .bind(self.defaults.default_retryable)
            .bind(self.defaults.backoff_cap_seconds as i32)
            .fetch_all(self.pool)
            .await?;

        let mut statuses: Vec<StepReadinessStatus> =
            rows.into_iter().map(ReadinessRow::into_status).collect();

        if let Some(ids) = step_ids {
            statuses.retain(|s| ids.contains(&s.workflow_step_uuid));
        }
        Ok(statuses)
    }

    /// Batch variant: one query per task, gathered concurrently-free (the
    /// pool serializes as needed); same row shape as `readiness_for`.
    pub async fn readiness_for_tasks(
        &self,
        task_uuids: &[Uuid],
    ) -> TaskerResult<Vec<StepReadinessStatus>> {
        let mut all = Vec::new();
        for &task_uuid in task_uuids {
            all.extend(self.readiness_for(task_uuid, None).await?);
        }
        Ok(all)
    }
}
