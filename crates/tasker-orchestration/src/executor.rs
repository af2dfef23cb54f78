//! Step Executor (C8): runs the 5-step dispatch protocol from §4.6 for one
//! batch of viable steps, bounded by a semaphore-gated worker pool so a slow
//! handler cannot stall claim-checking for the rest of the batch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tasker_shared::error::TaskerResult;
use tasker_shared::handler::HandlerOutcome;
use tasker_shared::models::{DependentSystem, NamedStep, Task, WorkflowStep, WorkflowStepEdge};
use tasker_shared::state_machine::step::{StepEvent, StepStateMachine};

use crate::events::{Event, EventBus};
use crate::registry::HandlerRegistry;

pub struct StepExecutor {
    pool: PgPool,
    bus: Arc<EventBus>,
    registry: Arc<HandlerRegistry>,
    worker_pool_size: usize,
}

impl StepExecutor {
    pub fn new(
        pool: PgPool,
        bus: Arc<EventBus>,
        registry: Arc<HandlerRegistry>,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            pool,
            bus,
            registry,
            worker_pool_size,
        }
    }

    /// Dispatches every step in `step_uuids` up to `worker_pool_size`
    /// concurrently. Claim losses are swallowed silently (§5 loser
    /// semantics); a missing handler is recorded as a permanent failure.
    pub async fn execute_batch(&self, task_uuid: Uuid, step_uuids: &[Uuid]) -> TaskerResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size.max(1)));
        let mut handles = Vec::with_capacity(step_uuids.len());

        for &step_uuid in step_uuids {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
            let pool = self.pool.clone();
            let bus = self.bus.clone();
            let registry = self.registry.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = execute_one(&pool, &bus, &registry, task_uuid, step_uuid).await {
                    tracing::error!(%task_uuid, %step_uuid, error = %err, "step dispatch failed");
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

async fn execute_one(
    pool: &PgPool,
    bus: &EventBus,
    registry: &HandlerRegistry,
    task_uuid: Uuid,
    step_uuid: Uuid,
) -> TaskerResult<()> {
    if !WorkflowStep::try_claim(pool, step_uuid).await? {
        tracing::debug!(%step_uuid, "lost claim race, another worker holds this step");
        return Ok(());
    }

    let mut state_machine = StepStateMachine::new(step_uuid, pool.clone());
    state_machine.transition(StepEvent::Dispatch).await?;

    bus.publish(&Event::StepExecutionRequested { task_uuid, step_uuid });

    let step = WorkflowStep::find_by_id(pool, step_uuid)
        .await?
        .ok_or(tasker_shared::TaskerError::NotFound {
            entity_type: "WorkflowStep",
            entity_id: step_uuid,
        })?;
    let named_step = NamedStep::find_by_id(pool, step.named_step_uuid)
        .await?
        .ok_or(tasker_shared::TaskerError::NotFound {
            entity_type: "NamedStep",
            entity_id: step.named_step_uuid,
        })?;
    let dependent_system = DependentSystem::find_by_id(pool, named_step.dependent_system_uuid)
        .await?
        .ok_or(tasker_shared::TaskerError::NotFound {
            entity_type: "DependentSystem",
            entity_id: named_step.dependent_system_uuid,
        })?;
    let task = Task::find_by_id(pool, task_uuid)
        .await?
        .ok_or(tasker_shared::TaskerError::NotFound {
            entity_type: "Task",
            entity_id: task_uuid,
        })?;

    let parent_results = parent_results_for(pool, task_uuid, step_uuid).await?;

    let key = (dependent_system.name.clone(), named_step.name.clone(), 1);
    let outcome = match registry.lookup(&key) {
        Some(handler) => {
            handler
                .handle(task.context.clone(), step.inputs.clone(), parent_results, CancellationToken::new())
                .await
        }
        None => HandlerOutcome::Failure {
            message: format!("no handler registered for {}/{}/v1", key.0, key.1),
            retryable: false,
            backoff_request_seconds: None,
        },
    };

    let attempt_number = step.attempts_or_zero() + 1;

    match outcome {
        HandlerOutcome::Success(results) => {
            WorkflowStep::record_success(pool, step_uuid, results).await?;
            state_machine.transition(StepEvent::Complete).await?;
            bus.publish(&Event::StepCompleted { task_uuid, step_uuid, attempt_number });
        }
        HandlerOutcome::Failure {
            message,
            retryable,
            backoff_request_seconds,
        } => {
            tracing::warn!(%step_uuid, %message, "handler reported failure");
            WorkflowStep::record_failure(
                pool,
                step_uuid,
                backoff_request_seconds.map(|s| s as i32),
            )
            .await?;
            // A handler signaling retryable=false is a permanent verdict
            // (§7 "HandlerError (permanent)"), independent of attempts vs.
            // retry_limit; persist it so the Oracle's ladder sees it on the
            // next readiness query.
            if !retryable {
                WorkflowStep::set_retryable(pool, step_uuid, false).await?;
            }
            state_machine.transition(StepEvent::Fail).await?;
            bus.publish(&Event::StepFailed { task_uuid, step_uuid, attempt_number });
        }
    }

    Ok(())
}

async fn parent_results_for(
    pool: &PgPool,
    task_uuid: Uuid,
    step_uuid: Uuid,
) -> TaskerResult<HashMap<Uuid, Option<Value>>> {
    let edges = WorkflowStepEdge::find_for_task(pool, task_uuid).await?;
    let parent_ids: Vec<Uuid> = edges
        .into_iter()
        .filter(|e| e.to_step_uuid == step_uuid)
        .map(|e| e.from_step_uuid)
        .collect();

    if parent_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let parents = WorkflowStep::find_many(pool, &parent_ids).await?;
    Ok(parents
        .into_iter()
        .map(|p| (p.workflow_step_uuid, p.results))
        .collect())
}
