//! Orchestration Coordinator (C12): boots and owns the components above,
//! exposing `process_task(id)` as the single entry point. Wires
//! StateMachine -> Discovery -> Executor -> Finalizer -> {Reenqueuer |
//! terminate} (§4.9).

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::error::TaskerResult;
use tasker_shared::state_machine::task::{TaskEvent, TaskState, TaskStateMachine};

use crate::aggregator::ExecutionContextAggregator;
use crate::discovery::ViableStepDiscovery;
use crate::events::{Event, EventBus};
use crate::executor::StepExecutor;
use crate::finalizer::{FinalizerAction, TaskFinalizer};
use crate::readiness::{ReadinessDefaults, ReadinessOracle};
use crate::reenqueue::Reenqueuer;
use crate::registry::HandlerRegistry;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    pub worker_pool_size: usize,
    pub finalizer_max_inline_iterations: u32,
    pub default_retry_limit: i32,
    pub default_retryable: bool,
    pub backoff_cap_seconds: i64,
    pub reenqueue_min_delay_seconds: i64,
    pub reenqueue_max_delay_seconds: i64,
}

pub struct OrchestrationCoordinator {
    pool: PgPool,
    bus: Arc<EventBus>,
    registry: Arc<HandlerRegistry>,
    reenqueuer: Arc<dyn Reenqueuer>,
    config: CoordinatorConfig,
}

impl OrchestrationCoordinator {
    pub fn new(
        pool: PgPool,
        bus: Arc<EventBus>,
        registry: Arc<HandlerRegistry>,
        reenqueuer: Arc<dyn Reenqueuer>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            pool,
            bus,
            registry,
            reenqueuer,
            config,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// One tick: runs at most `finalizer_max_inline_iterations`
    /// Discover/Execute/Finalize cycles, per the glossary's definition of
    /// "tick", before yielding.
    pub async fn process_task(&self, task_uuid: Uuid) -> TaskerResult<FinalizerAction> {
        let mut task_sm = TaskStateMachine::new(task_uuid, self.pool.clone());
        if task_sm.current_state().await? == TaskState::Pending {
            task_sm.transition(TaskEvent::Start).await?;
            self.bus.publish(&Event::TaskStarted { task_uuid });
        }

        let readiness_defaults = ReadinessDefaults {
            default_retry_limit: self.config.default_retry_limit,
            default_retryable: self.config.default_retryable,
            backoff_cap_seconds: self.config.backoff_cap_seconds,
        };
        let oracle = ReadinessOracle::new(&self.pool, readiness_defaults);
        let discovery = ViableStepDiscovery::new(&oracle, &self.bus);
        let aggregator = ExecutionContextAggregator::new(&self.pool, &oracle);
        let executor = StepExecutor::new(
            self.pool.clone(),
            self.bus.clone(),
            self.registry.clone(),
            self.config.worker_pool_size,
        );
        let finalizer = TaskFinalizer::new(
            self.pool.clone(),
            &self.bus,
            self.reenqueuer.as_ref(),
            self.config.reenqueue_min_delay_seconds,
            self.config.reenqueue_max_delay_seconds,
        );

        let mut action = FinalizerAction::NoOp;
        for _ in 0..self.config.finalizer_max_inline_iterations.max(1) {
            let viable = discovery.discover(task_uuid).await?;
            if !viable.is_empty() {
                executor.execute_batch(task_uuid, &viable).await?;
            }

            let ctx = aggregator.context_for(task_uuid).await?;
            self.bus.publish(&Event::TaskFinalizationRequested { task_uuid });
            action = finalizer.finalize(task_uuid, &ctx).await?;

            if action != FinalizerAction::ExecuteMoreSteps {
                break;
            }
        }

        Ok(action)
    }
}
