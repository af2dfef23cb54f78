//! Execution Context Aggregator (C4).
//!
//! The Oracle only returns *unprocessed* steps (§4.3's `processed = false`
//! guard), so `completed`/`total` cannot be derived from its rows alone —
//! those counts come from a second, cheap query over `workflow_steps`
//! directly. The rest of the roll-up (`pending`, `in_progress`, `failed`,
//! `ready`, `permanently_blocked`) folds the Oracle's rows in Rust; §6
//! permits inlining the aggregation in application code provided the
//! outputs match a single aggregate query.

use bigdecimal::{BigDecimal, FromPrimitive};
use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::error::TaskerResult;
use tasker_shared::models::{
    ExecutionStatus, HealthStatus, StepReadinessStatus, TaskExecutionContext,
};

use crate::readiness::ReadinessOracle;

pub struct ExecutionContextAggregator<'a> {
    pool: &'a PgPool,
    oracle: &'a ReadinessOracle<'a>,
}

impl<'a> ExecutionContextAggregator<'a> {
    pub fn new(pool: &'a PgPool, oracle: &'a ReadinessOracle<'a>) -> Self {
        Self { pool, oracle }
    }

    pub async fn context_for(&self, task_uuid: Uuid) -> TaskerResult<TaskExecutionContext> {
        let (total, completed): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE processed) \
             FROM tasker.workflow_steps WHERE task_uuid = $1",
        )
        .bind(task_uuid)
        .fetch_one(self.pool)
        .await?;

        let rows = self.oracle.readiness_for(task_uuid, None).await?;
        Ok(fold(task_uuid, total, completed, &rows))
    }
}

/// Pure fold, split out from `context_for` so boundary cases (zero steps,
/// all permanently blocked) can be unit-tested without a database.
/// `total`/`completed` describe the whole step set; `unprocessed_rows` are
/// the Oracle's output for everything still in flight.
pub fn fold(
    task_uuid: Uuid,
    total: i64,
    completed: i64,
    unprocessed_rows: &[StepReadinessStatus],
) -> TaskExecutionContext {
    let mut pending = 0i64;
    let mut in_progress = 0i64;
    let mut failed = 0i64;
    let mut ready = 0i64;
    let mut permanently_blocked = 0i64;
    let mut earliest_next_retry_at = None;

    for row in unprocessed_rows {
        match row.current_state.as_str() {
            "pending" => pending += 1,
            "in_progress" => in_progress += 1,
            "error" => {
                failed += 1;
                if row.attempts >= row.retry_limit {
                    permanently_blocked += 1;
                }
            }
            // Anomalous: processed = false but state already terminal. The
            // Oracle's `processed` guard already excludes it from
            // ready_for_execution; here it contributes to neither pending
            // nor failed.
            _ => {}
        }

        if row.ready_for_execution {
            ready += 1;
        }

        if let Some(next_retry_at) = row.next_retry_at {
            earliest_next_retry_at = Some(match earliest_next_retry_at {
                Some(current) if current < next_retry_at => current,
                _ => next_retry_at,
            });
        }
    }

    let execution_status = if ready > 0 {
        ExecutionStatus::HasReadySteps
    } else if in_progress > 0 {
        ExecutionStatus::Processing
    } else if permanently_blocked > 0 && ready == 0 {
        ExecutionStatus::BlockedByFailures
    } else if total > 0 && completed == total {
        ExecutionStatus::AllComplete
    } else {
        ExecutionStatus::WaitingForDependencies
    };

    let completion_percentage = if total == 0 {
        BigDecimal::from(0)
    } else {
        let raw = BigDecimal::from_i64(completed * 10000).unwrap_or_default()
            / BigDecimal::from_i64(total).unwrap_or_else(|| BigDecimal::from(1));
        (raw / BigDecimal::from(100)).with_scale(2)
    };

    let health_status = if failed == 0 {
        HealthStatus::Healthy
    } else if permanently_blocked > 0 && ready == 0 {
        HealthStatus::Blocked
    } else if ready > 0 || failed > permanently_blocked {
        HealthStatus::Recovering
    } else {
        HealthStatus::Unknown
    };

    TaskExecutionContext {
        task_uuid,
        total,
        pending,
        in_progress,
        completed,
        failed,
        ready,
        permanently_blocked,
        execution_status,
        recommended_action: execution_status.recommended_action(),
        completion_percentage,
        health_status,
        earliest_next_retry_at,
    }
}
