//! Output shapes of the Readiness Oracle (C3) and Execution Context
//! Aggregator (C4) — SPEC_FULL.md §4.3–4.4. These are read-only projections;
//! nothing here is ever written back to the database.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row per unprocessed step, as computed by `ReadinessOracle`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StepReadinessStatus {
    pub workflow_step_uuid: Uuid,
    pub task_uuid: Uuid,
    pub current_state: String,
    pub in_process: bool,
    pub dependencies_satisfied: bool,
    pub retry_eligible: bool,
    pub ready_for_execution: bool,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub total_parents: i64,
    pub completed_parents: i64,
    pub attempts: i32,
    pub retry_limit: i32,
    pub backoff_request_seconds: Option<i32>,
    pub last_attempted_at: Option<DateTime<Utc>>,
}

/// 1-to-1 with `ExecutionStatus`, per §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    ExecuteReadySteps,
    WaitForCompletion,
    HandleFailures,
    FinalizeTask,
    WaitForDependencies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    HasReadySteps,
    Processing,
    BlockedByFailures,
    AllComplete,
    WaitingForDependencies,
}

impl ExecutionStatus {
    pub fn recommended_action(self) -> RecommendedAction {
        match self {
            ExecutionStatus::HasReadySteps => RecommendedAction::ExecuteReadySteps,
            ExecutionStatus::Processing => RecommendedAction::WaitForCompletion,
            ExecutionStatus::BlockedByFailures => RecommendedAction::HandleFailures,
            ExecutionStatus::AllComplete => RecommendedAction::FinalizeTask,
            ExecutionStatus::WaitingForDependencies => RecommendedAction::WaitForDependencies,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Recovering,
    Blocked,
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Recovering => "recovering",
            HealthStatus::Blocked => "blocked",
            HealthStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Per-task roll-up computed by `ExecutionContextAggregator` over the
/// Oracle's rows for that task. See §4.4 for the derivation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionContext {
    pub task_uuid: Uuid,
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub ready: i64,
    pub permanently_blocked: i64,
    pub execution_status: ExecutionStatus,
    pub recommended_action: RecommendedAction,
    pub completion_percentage: BigDecimal,
    pub health_status: HealthStatus,
    /// Earliest `next_retry_at` across all non-ready, non-blocked steps, used
    /// by the Finalizer to compute the Reenqueuer delay.
    pub earliest_next_retry_at: Option<DateTime<Utc>>,
}
