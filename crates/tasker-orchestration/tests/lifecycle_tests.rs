//! Integration tests for the end-to-end scenarios the orchestration CORE
//! promises: linear completion, exponential and explicit backoff, diamond
//! partial failure, concurrent claim races, and idempotent submission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tasker_orchestration::aggregator::ExecutionContextAggregator;
use tasker_orchestration::coordinator::{CoordinatorConfig, OrchestrationCoordinator};
use tasker_orchestration::discovery::ViableStepDiscovery;
use tasker_orchestration::events::EventBus;
use tasker_orchestration::finalizer::FinalizerAction;
use tasker_orchestration::initializer::{TaskInitializer, TaskSubmission};
use tasker_orchestration::readiness::{ReadinessDefaults, ReadinessOracle};
use tasker_orchestration::reenqueue::NullReenqueuer;
use tasker_orchestration::registry::HandlerRegistry;

use tasker_shared::handler::{HandlerOutcome, StepHandler};
use tasker_shared::identity::Sha256FieldHashStrategy;
use tasker_shared::models::{ExecutionStatus, NamedTasksNamedStep, WorkflowStep, WorkflowStepEdge};
use tasker_shared::state_machine::step::{StepEvent, StepStateMachine};
use tasker_shared::test_factories::{NamedStepFactory, NamedTaskFactory, TaskFactory};

/// Echoes `step_inputs` back as the result. Stands in for a real handler.
struct EchoStepHandler;

#[async_trait]
impl StepHandler for EchoStepHandler {
    async fn handle(
        &self,
        _context: Option<Value>,
        step_inputs: Option<Value>,
        _parent_results: HashMap<Uuid, Option<Value>>,
        _cancellation: CancellationToken,
    ) -> HandlerOutcome {
        HandlerOutcome::Success(step_inputs)
    }
}

/// Always fails with a configurable retryable flag and explicit backoff.
struct FailingStepHandler {
    retryable: bool,
    backoff_request_seconds: Option<i64>,
}

#[async_trait]
impl StepHandler for FailingStepHandler {
    async fn handle(
        &self,
        _context: Option<Value>,
        _step_inputs: Option<Value>,
        _parent_results: HashMap<Uuid, Option<Value>>,
        _cancellation: CancellationToken,
    ) -> HandlerOutcome {
        HandlerOutcome::Failure {
            message: "simulated failure".to_string(),
            retryable: self.retryable,
            backoff_request_seconds: self.backoff_request_seconds,
        }
    }
}

fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig {
        worker_pool_size: 4,
        finalizer_max_inline_iterations: 25,
        default_retry_limit: 3,
        default_retryable: true,
        backoff_cap_seconds: 30,
        reenqueue_min_delay_seconds: 1,
        reenqueue_max_delay_seconds: 30,
    }
}

fn readiness_defaults() -> ReadinessDefaults {
    ReadinessDefaults {
        default_retry_limit: 3,
        default_retryable: true,
        backoff_cap_seconds: 30,
    }
}

/// Builds a task with `step_names.len()` steps, one named step each linked to
/// the same named task, and returns `(task_uuid, step_uuids_in_order)`.
/// Callers add edges themselves via `WorkflowStepEdge::create`.
async fn build_task_with_steps(pool: &PgPool, step_names: &[&str]) -> Result<(Uuid, Vec<Uuid>)> {
    let named_task = NamedTaskFactory::new()
        .namespace(format!("ns-{}", Uuid::now_v7()))
        .name("lifecycle_test_task")
        .create(pool)
        .await?;
    let task = TaskFactory::new()
        .for_named_task(named_task.named_task_uuid)
        .context(json!({"input": 1}))
        .create(pool)
        .await?;

    let mut step_uuids = Vec::with_capacity(step_names.len());
    for name in step_names {
        let named_step = NamedStepFactory::new()
            .name(*name)
            .create_linked_to(pool, named_task.named_task_uuid)
            .await?;
        let step = WorkflowStep::create(
            pool,
            tasker_shared::models::NewWorkflowStep {
                workflow_step_uuid: Uuid::now_v7(),
                task_uuid: task.task_uuid,
                named_step_uuid: named_step.named_step_uuid,
                retryable: true,
                retry_limit: None,
                skippable: false,
                inputs: Some(json!({"value": name})),
            },
        )
        .await?;
        step_uuids.push(step.workflow_step_uuid);
    }

    Ok((task.task_uuid, step_uuids))
}

/// S1: a linear two-step DAG (A -> B) runs to completion in one coordinator
/// tick sequence, with no handler ever failing.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn linear_happy_path_completes_task(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["step_a", "step_b"]).await?;
    WorkflowStepEdge::create(&pool, task_uuid, steps[0], steps[1], None).await?;

    let bus = Arc::new(EventBus::new());
    let mut map: HashMap<tasker_orchestration::registry::HandlerKey, Arc<dyn StepHandler>> =
        HashMap::new();
    map.insert(
        ("test_system".to_string(), "step_a".to_string(), 1),
        Arc::new(EchoStepHandler) as Arc<dyn StepHandler>,
    );
    map.insert(
        ("test_system".to_string(), "step_b".to_string(), 1),
        Arc::new(EchoStepHandler) as Arc<dyn StepHandler>,
    );
    let registry = Arc::new(HandlerRegistry::from(map));
    let reenqueuer = Arc::new(NullReenqueuer::new());

    let coordinator = OrchestrationCoordinator::new(
        pool.clone(),
        bus,
        registry,
        reenqueuer,
        coordinator_config(),
    );

    let action = coordinator.process_task(task_uuid).await?;
    assert_eq!(action, FinalizerAction::Finalized);

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let aggregator = ExecutionContextAggregator::new(&pool, &oracle);
    let ctx = aggregator.context_for(task_uuid).await?;
    assert_eq!(ctx.execution_status, ExecutionStatus::AllComplete);
    assert_eq!(ctx.completed, 2);
    Ok(())
}

/// S2: a step that fails with no explicit backoff becomes retry-ineligible
/// immediately afterward (the exponential floor), then eligible again once
/// enough time has elapsed.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn exponential_backoff_gates_then_releases_retry(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["flaky_step"]).await?;
    let step_uuid = steps[0];

    WorkflowStep::try_claim(&pool, step_uuid).await?;
    let mut sm = StepStateMachine::new(step_uuid, pool.clone());
    sm.transition(StepEvent::Dispatch).await?;
    WorkflowStep::record_failure(&pool, step_uuid, None).await?;
    sm.transition(StepEvent::Fail).await?;

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let immediately_after = oracle.readiness_for(task_uuid, None).await?;
    let status = immediately_after
        .iter()
        .find(|s| s.workflow_step_uuid == step_uuid)
        .expect("step present in readiness rows");
    assert!(
        !status.ready_for_execution,
        "a step that just failed must not be immediately retry-eligible"
    );

    // Simulate the backoff window elapsing: push last_attempted_at into the
    // past far enough to clear 2^attempts (attempts=1 -> 2s, capped at 30).
    sqlx::query(
        "UPDATE tasker.workflow_steps SET last_attempted_at = now() - interval '1 hour' \
         WHERE workflow_step_uuid = $1",
    )
    .bind(step_uuid)
    .execute(&pool)
    .await?;

    let after_elapsed = oracle.readiness_for(task_uuid, None).await?;
    let status = after_elapsed
        .iter()
        .find(|s| s.workflow_step_uuid == step_uuid)
        .expect("step present in readiness rows");
    assert!(status.ready_for_execution);
    assert!(status.retry_eligible);
    Ok(())
}

/// S3: an explicit backoff request overrides the exponential ladder, keeping
/// a step ineligible even after the exponential window would have cleared.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn explicit_backoff_overrides_exponential_ladder(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["slow_backoff_step"]).await?;
    let step_uuid = steps[0];

    WorkflowStep::try_claim(&pool, step_uuid).await?;
    let mut sm = StepStateMachine::new(step_uuid, pool.clone());
    sm.transition(StepEvent::Dispatch).await?;
    // Explicit backoff far longer than the exponential floor for attempts=1.
    WorkflowStep::record_failure(&pool, step_uuid, Some(3600)).await?;
    sm.transition(StepEvent::Fail).await?;

    // Enough time for the *exponential* ladder to have cleared, but nowhere
    // near the explicit 3600s request.
    sqlx::query(
        "UPDATE tasker.workflow_steps SET last_attempted_at = now() - interval '10 seconds' \
         WHERE workflow_step_uuid = $1",
    )
    .bind(step_uuid)
    .execute(&pool)
    .await?;

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let rows = oracle.readiness_for(task_uuid, None).await?;
    let status = rows
        .iter()
        .find(|s| s.workflow_step_uuid == step_uuid)
        .expect("step present in readiness rows");
    assert!(
        !status.ready_for_execution,
        "explicit backoff must gate retry even though the exponential floor cleared"
    );
    Ok(())
}

/// S4: a diamond (root -> {A, B} -> join) where A fails permanently leaves
/// the task `blocked_by_failures` once B completes and no step remains
/// ready — not merely `waiting_for_dependencies`.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn diamond_partial_failure_blocks_task_once_no_ready_steps_remain(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) =
        build_task_with_steps(&pool, &["root", "branch_a", "branch_b", "join"]).await?;
    let (root, branch_a, branch_b, join) = (steps[0], steps[1], steps[2], steps[3]);
    WorkflowStepEdge::create(&pool, task_uuid, root, branch_a, None).await?;
    WorkflowStepEdge::create(&pool, task_uuid, root, branch_b, None).await?;
    WorkflowStepEdge::create(&pool, task_uuid, branch_a, join, None).await?;
    WorkflowStepEdge::create(&pool, task_uuid, branch_b, join, None).await?;

    // root completes immediately.
    WorkflowStep::try_claim(&pool, root).await?;
    let mut root_sm = StepStateMachine::new(root, pool.clone());
    root_sm.transition(StepEvent::Dispatch).await?;
    WorkflowStep::record_success(&pool, root, Some(json!({"ok": true}))).await?;
    root_sm.transition(StepEvent::Complete).await?;

    // branch_a fails permanently (retry_limit exhausted in one attempt).
    sqlx::query("UPDATE tasker.workflow_steps SET retry_limit = 1 WHERE workflow_step_uuid = $1")
        .bind(branch_a)
        .execute(&pool)
        .await?;
    WorkflowStep::try_claim(&pool, branch_a).await?;
    let mut a_sm = StepStateMachine::new(branch_a, pool.clone());
    a_sm.transition(StepEvent::Dispatch).await?;
    WorkflowStep::record_failure(&pool, branch_a, None).await?;
    a_sm.transition(StepEvent::Fail).await?;

    // branch_b completes.
    WorkflowStep::try_claim(&pool, branch_b).await?;
    let mut b_sm = StepStateMachine::new(branch_b, pool.clone());
    b_sm.transition(StepEvent::Dispatch).await?;
    WorkflowStep::record_success(&pool, branch_b, Some(json!({"ok": true}))).await?;
    b_sm.transition(StepEvent::Complete).await?;

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let aggregator = ExecutionContextAggregator::new(&pool, &oracle);
    let ctx = aggregator.context_for(task_uuid).await?;

    // join cannot run (branch_a never completes); branch_a has exhausted its
    // retry_limit; nothing else is ready. The task must read as permanently
    // blocked, not merely waiting.
    assert_eq!(ctx.ready, 0);
    assert_eq!(ctx.permanently_blocked, 1);
    assert_eq!(ctx.execution_status, ExecutionStatus::BlockedByFailures);

    let join_row = ReadinessOracle::new(&pool, readiness_defaults())
        .readiness_for(task_uuid, None)
        .await?
        .into_iter()
        .find(|s| s.workflow_step_uuid == join)
        .expect("join present in readiness rows");
    assert!(!join_row.dependencies_satisfied, "join must stay blocked on branch_a");
    Ok(())
}

/// S5: two concurrent claim attempts on the same step — exactly one wins.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn concurrent_claim_race_has_exactly_one_winner(pool: PgPool) -> Result<()> {
    let (_task_uuid, steps) = build_task_with_steps(&pool, &["contended_step"]).await?;
    let step_uuid = steps[0];

    let pool_a = pool.clone();
    let pool_b = pool.clone();
    let (won_a, won_b) = tokio::join!(
        async move { WorkflowStep::try_claim(&pool_a, step_uuid).await },
        async move { WorkflowStep::try_claim(&pool_b, step_uuid).await },
    );
    let winners = [won_a?, won_b?].into_iter().filter(|w| *w).count();
    assert_eq!(winners, 1, "exactly one of the two concurrent claims must win");
    Ok(())
}

/// S6: submitting the same logical task twice (identical identity fields)
/// deduplicates to a single task row instead of creating a second one.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn idempotent_submission_deduplicates_by_identity_hash(pool: PgPool) -> Result<()> {
    let named_task = NamedTaskFactory::new()
        .namespace("idempotency_ns")
        .name("idempotent_task")
        .create(&pool)
        .await?;
    NamedStepFactory::new()
        .name("only_step")
        .create_linked_to(&pool, named_task.named_task_uuid)
        .await?;

    let bus = Arc::new(EventBus::new());
    let identity_strategy = Sha256FieldHashStrategy;
    let identity_fields = vec!["name".to_string(), "context".to_string()];
    let initializer = TaskInitializer::new(
        pool.clone(),
        bus,
        &identity_strategy,
        &identity_fields,
    );

    let submission = || TaskSubmission {
        namespace: "idempotency_ns".to_string(),
        name: "idempotent_task".to_string(),
        version: 1,
        context: Some(json!({"k": "v"})),
        initiator: Some("first".to_string()),
        source_system: None,
        reason: None,
        tags: None,
    };

    let first = initializer.submit_task(submission()).await?;
    let second = initializer.submit_task(submission()).await?;
    assert_eq!(first, second);

    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tasker.tasks WHERE named_task_uuid = $1")
            .bind(named_task.named_task_uuid)
            .fetch_one(&pool)
            .await?;
    assert_eq!(count.0, 1);
    Ok(())
}

/// Boundary: `NamedTasksNamedStep::find_for_named_task` drives step
/// materialization in `submit_task`; a task with two linked steps gets two
/// `WorkflowStep` rows and no edges (the data model carries no edge
/// template), matching the documented limitation.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn submit_task_materializes_flat_step_set_without_edges(pool: PgPool) -> Result<()> {
    let named_task = NamedTaskFactory::new()
        .namespace("materialize_ns")
        .name("materialize_task")
        .create(&pool)
        .await?;
    NamedStepFactory::new()
        .name("first")
        .create_linked_to(&pool, named_task.named_task_uuid)
        .await?;
    NamedStepFactory::new()
        .name("second")
        .create_linked_to(&pool, named_task.named_task_uuid)
        .await?;

    let bus = Arc::new(EventBus::new());
    let identity_strategy = Sha256FieldHashStrategy;
    let identity_fields = vec!["name".to_string(), "context".to_string()];
    let initializer =
        TaskInitializer::new(pool.clone(), bus, &identity_strategy, &identity_fields);

    let task_uuid = initializer
        .submit_task(TaskSubmission {
            namespace: "materialize_ns".to_string(),
            name: "materialize_task".to_string(),
            version: 1,
            context: Some(json!({"run": Uuid::now_v7().to_string()})),
            initiator: None,
            source_system: None,
            reason: None,
            tags: None,
        })
        .await?;

    let steps = WorkflowStep::find_for_task(&pool, task_uuid).await?;
    assert_eq!(steps.len(), 2);
    let edges = WorkflowStepEdge::find_for_task(&pool, task_uuid).await?;
    assert!(edges.is_empty());

    let links = NamedTasksNamedStep::find_for_named_task(&pool, named_task.named_task_uuid).await?;
    assert_eq!(links.len(), 2);
    Ok(())
}

/// A handler whose `custom_event_configuration` errors must not end up in
/// the registry at all — registration fails atomically (§6).
struct BadEventConfigHandler;

#[async_trait]
impl StepHandler for BadEventConfigHandler {
    fn custom_event_configuration(
        &self,
    ) -> Result<Vec<tasker_shared::handler::CustomEventDescriptor>, String> {
        Err("bad event descriptor".to_string())
    }

    async fn handle(
        &self,
        _context: Option<Value>,
        _step_inputs: Option<Value>,
        _parent_results: HashMap<Uuid, Option<Value>>,
        _cancellation: CancellationToken,
    ) -> HandlerOutcome {
        HandlerOutcome::Success(None)
    }
}

#[tokio::test]
async fn registration_failure_leaves_registry_untouched() {
    let registry = HandlerRegistry::new();
    let key = ("sys".to_string(), "bad_step".to_string(), 1);
    let result = registry.register(key.clone(), Arc::new(BadEventConfigHandler));
    assert!(result.is_err());
    assert!(registry.lookup(&key).is_none());
    assert!(registry.is_empty());
}

/// A step with no parents and a missing handler is dispatched to a
/// permanent failure (no handler found), not silently skipped.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn missing_handler_records_permanent_failure(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["unregistered_step"]).await?;

    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(HandlerRegistry::new());
    let executor = tasker_orchestration::executor::StepExecutor::new(
        pool.clone(),
        bus,
        registry,
        4,
    );
    executor.execute_batch(task_uuid, &steps).await?;

    let step = WorkflowStep::find_by_id(&pool, steps[0]).await?.expect("step exists");
    assert!(!step.processed);
    assert_eq!(step.attempts_or_zero(), 1);
    Ok(())
}

/// A handler reporting `retryable: false` must have that verdict persisted
/// to the step row, not just folded into the in-memory outcome — the Oracle
/// reads `workflow_steps.retryable` on the next readiness query.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn non_retryable_handler_failure_persists_to_step_row(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["always_fails"]).await?;

    let bus = Arc::new(EventBus::new());
    let mut map: HashMap<tasker_orchestration::registry::HandlerKey, Arc<dyn StepHandler>> =
        HashMap::new();
    map.insert(
        ("test_system".to_string(), "always_fails".to_string(), 1),
        Arc::new(FailingStepHandler {
            retryable: false,
            backoff_request_seconds: None,
        }) as Arc<dyn StepHandler>,
    );
    let registry = Arc::new(HandlerRegistry::from(map));

    let executor = tasker_orchestration::executor::StepExecutor::new(pool.clone(), bus, registry, 4);
    executor.execute_batch(task_uuid, &steps).await?;

    let step = WorkflowStep::find_by_id(&pool, steps[0]).await?.expect("step exists");
    assert!(!step.retryable, "a retryable=false verdict must be written back to the row");
    assert_eq!(step.attempts_or_zero(), 1);

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let rows = oracle.readiness_for(task_uuid, None).await?;
    let status = rows
        .iter()
        .find(|s| s.workflow_step_uuid == steps[0])
        .expect("step present in readiness rows");
    assert!(!status.retry_eligible, "retryable=false must gate the ladder regardless of attempts vs. retry_limit");
    Ok(())
}

/// The Finalizer's `WaitingForDependencies` branch calls through to the
/// `Reenqueuer` with a clamped delay when a concrete next-retry time exists.
#[tokio::test]
async fn finalizer_clamps_reenqueue_delay_and_calls_reenqueuer() {
    use bigdecimal::BigDecimal;
    use tasker_orchestration::finalizer::TaskFinalizer;
    use tasker_shared::models::{HealthStatus, TaskExecutionContext};

    let reenqueuer = NullReenqueuer::new();
    let bus = EventBus::new();
    let call_count = Arc::new(AtomicUsize::new(0));
    let counter = call_count.clone();
    bus.subscribe("task.reenqueue_requested", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // This test only exercises the pure decision + event-publish path; the
    // DB-touching state-machine branches are covered by the scenario tests
    // above, so a `None` DB pool is never reached here (WaitingForDependencies
    // with a retry time never calls the task state machine).
    let task_uuid = Uuid::now_v7();
    let ctx = TaskExecutionContext {
        task_uuid,
        total: 1,
        pending: 0,
        in_progress: 0,
        completed: 0,
        failed: 1,
        ready: 0,
        permanently_blocked: 0,
        execution_status: ExecutionStatus::WaitingForDependencies,
        recommended_action: ExecutionStatus::WaitingForDependencies.recommended_action(),
        completion_percentage: BigDecimal::from(0),
        health_status: HealthStatus::Recovering,
        earliest_next_retry_at: Some(chrono::Utc::now() + chrono::Duration::seconds(3600)),
    };

    // TaskFinalizer needs a pool only for the task-state-machine branches; a
    // disconnected lazy pool never gets used on the WaitingForDependencies
    // path exercised here.
    let pool = sqlx::PgPool::connect_lazy("postgres://unused/unused").expect("lazy pool");
    let finalizer = TaskFinalizer::new(pool, &bus, &reenqueuer, 1, 30);
    let action = finalizer.finalize(task_uuid, &ctx).await.expect("finalize should not touch the DB here");

    assert_eq!(action, FinalizerAction::Reenqueued);
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
    let calls = reenqueuer.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, std::time::Duration::from_secs(30), "delay must clamp to the configured max");
}

/// A step claimed by one worker (`in_process = true`) but not yet
/// transitioned out of `pending` must not be reported ready — otherwise a
/// second worker's Discovery pass would re-dispatch it before the first
/// worker records a result.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn in_process_step_is_not_ready_for_execution(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["claimed_step"]).await?;
    let step_uuid = steps[0];

    let claimed = WorkflowStep::try_claim(&pool, step_uuid).await?;
    assert!(claimed);

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let rows = oracle.readiness_for(task_uuid, None).await?;
    let status = rows
        .iter()
        .find(|s| s.workflow_step_uuid == step_uuid)
        .expect("step present in readiness rows");
    assert!(status.in_process);
    assert!(
        !status.ready_for_execution,
        "a claimed-but-undispatched step must not be ready for a second claim"
    );
    Ok(())
}

/// A step seeded with `attempts = 0` but an explicit `backoff_request_seconds`
/// already set (e.g. an operator backfill) must honor that explicit backoff
/// rather than taking the "never attempted" shortcut.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn attempts_zero_with_explicit_backoff_is_not_immediately_eligible(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["preseeded_backoff_step"]).await?;
    let step_uuid = steps[0];

    sqlx::query(
        "UPDATE tasker.workflow_steps \
         SET attempts = 0, last_attempted_at = now(), backoff_request_seconds = 3600 \
         WHERE workflow_step_uuid = $1",
    )
    .bind(step_uuid)
    .execute(&pool)
    .await?;

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let rows = oracle.readiness_for(task_uuid, None).await?;
    let status = rows
        .iter()
        .find(|s| s.workflow_step_uuid == step_uuid)
        .expect("step present in readiness rows");
    assert!(
        !status.retry_eligible,
        "attempts = 0 must not bypass an explicit backoff already set on the row"
    );
    Ok(())
}

/// `readiness_for`'s `step_ids` filter narrows the result to the requested
/// subset without affecting dependency-count computation.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn readiness_for_step_ids_narrows_the_result(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["step_one", "step_two"]).await?;

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let all = oracle.readiness_for(task_uuid, None).await?;
    assert_eq!(all.len(), 2);

    let subset = oracle.readiness_for(task_uuid, Some(&[steps[0]])).await?;
    assert_eq!(subset.len(), 1);
    assert_eq!(subset[0].workflow_step_uuid, steps[0]);
    Ok(())
}

// Keep discovery's own publish wiring covered at the integration level too.
#[sqlx::test(migrator = "tasker_shared::database::MIGRATOR")]
async fn discovery_publishes_no_viable_steps_when_all_blocked(pool: PgPool) -> Result<()> {
    let (task_uuid, steps) = build_task_with_steps(&pool, &["blocked_step"]).await?;
    sqlx::query("UPDATE tasker.workflow_steps SET retry_limit = 0 WHERE workflow_step_uuid = $1")
        .bind(steps[0])
        .execute(&pool)
        .await?;
    WorkflowStep::try_claim(&pool, steps[0]).await?;
    let mut sm = StepStateMachine::new(steps[0], pool.clone());
    sm.transition(StepEvent::Dispatch).await?;
    WorkflowStep::record_failure(&pool, steps[0], None).await?;
    sm.transition(StepEvent::Fail).await?;

    let bus = EventBus::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    bus.subscribe("workflow.no_viable_steps", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let oracle = ReadinessOracle::new(&pool, readiness_defaults());
    let discovery = ViableStepDiscovery::new(&oracle, &bus);
    let viable = discovery.discover(task_uuid).await?;
    assert!(viable.is_empty());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}
