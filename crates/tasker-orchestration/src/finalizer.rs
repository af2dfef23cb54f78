//! Task Finalizer (C9): consults the Execution Context and decides one
//! action per invocation (§4.7's decision table). Single-shot — the
//! re-entry loop for `has_ready_steps` lives in the Coordinator, bounded by
//! its safety counter, not here.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use tasker_shared::error::TaskerResult;
use tasker_shared::models::{ExecutionStatus, TaskExecutionContext};
use tasker_shared::state_machine::task::{TaskEvent, TaskStateMachine};

use crate::events::{Event, EventBus};
use crate::reenqueue::Reenqueuer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerAction {
    ExecuteMoreSteps,
    WaitForCompletion,
    Finalized,
    Reenqueued,
    NoOp,
}

pub struct TaskFinalizer<'a> {
    task_state_machine_pool: sqlx::PgPool,
    bus: &'a EventBus,
    reenqueuer: &'a dyn Reenqueuer,
    reenqueue_min_delay_seconds: i64,
    reenqueue_max_delay_seconds: i64,
}

impl<'a> TaskFinalizer<'a> {
    pub fn new(
        pool: sqlx::PgPool,
        bus: &'a EventBus,
        reenqueuer: &'a dyn Reenqueuer,
        reenqueue_min_delay_seconds: i64,
        reenqueue_max_delay_seconds: i64,
    ) -> Self {
        Self {
            task_state_machine_pool: pool,
            bus,
            reenqueuer,
            reenqueue_min_delay_seconds,
            reenqueue_max_delay_seconds,
        }
    }

    pub async fn finalize(
        &self,
        task_uuid: Uuid,
        ctx: &TaskExecutionContext,
    ) -> TaskerResult<FinalizerAction> {
        match ctx.execution_status {
            ExecutionStatus::HasReadySteps => Ok(FinalizerAction::ExecuteMoreSteps),
            ExecutionStatus::Processing => Ok(FinalizerAction::WaitForCompletion),
            ExecutionStatus::BlockedByFailures => {
                let mut sm = TaskStateMachine::new(task_uuid, self.task_state_machine_pool.clone());
                sm.transition(TaskEvent::Fail).await?;
                self.bus.publish(&Event::TaskFailed { task_uuid });
                Ok(FinalizerAction::Finalized)
            }
            ExecutionStatus::AllComplete => {
                let mut sm = TaskStateMachine::new(task_uuid, self.task_state_machine_pool.clone());
                sm.transition(TaskEvent::Complete).await?;
                self.bus.publish(&Event::TaskCompleted { task_uuid });
                Ok(FinalizerAction::Finalized)
            }
            ExecutionStatus::WaitingForDependencies => match ctx.earliest_next_retry_at {
                Some(next_retry_at) => {
                    let raw_seconds = (next_retry_at - Utc::now()).num_seconds();
                    let delay_seconds = raw_seconds.clamp(
                        self.reenqueue_min_delay_seconds,
                        self.reenqueue_max_delay_seconds,
                    );
                    self.reenqueuer
                        .schedule(task_uuid, Duration::from_secs(delay_seconds.max(0) as u64))
                        .await;
                    self.bus.publish(&Event::TaskReenqueueRequested { task_uuid, delay_seconds });
                    Ok(FinalizerAction::Reenqueued)
                }
                None => Ok(FinalizerAction::NoOp),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_status(execution_status: ExecutionStatus) -> TaskExecutionContext {
        use bigdecimal::BigDecimal;
        TaskExecutionContext {
            task_uuid: Uuid::now_v7(),
            total: 1,
            pending: 0,
            in_progress: 0,
            completed: 0,
            failed: 0,
            ready: 0,
            permanently_blocked: 0,
            execution_status,
            recommended_action: execution_status.recommended_action(),
            completion_percentage: BigDecimal::from(0),
            health_status: tasker_shared::models::HealthStatus::Unknown,
            earliest_next_retry_at: None,
        }
    }

    #[test]
    fn decision_table_action_mapping_is_total() {
        for status in [
            ExecutionStatus::HasReadySteps,
            ExecutionStatus::Processing,
            ExecutionStatus::BlockedByFailures,
            ExecutionStatus::AllComplete,
            ExecutionStatus::WaitingForDependencies,
        ] {
            let _ = ctx_with_status(status);
        }
    }
}
