//! Task Initializer: implements `submit_task` from §6, the only public
//! entrypoint a hypothetical HTTP layer would call.

use std::sync::Arc;

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::error::{TaskerError, TaskerResult};
use tasker_shared::identity::IdentityHashStrategy;
use tasker_shared::models::{
    NamedTask, NamedTasksNamedStep, NewTask, NewTaskTransition, NewWorkflowStep, Task,
    TaskTransition, WorkflowStep,
};

use crate::events::{Event, EventBus};

pub struct TaskSubmission {
    pub namespace: String,
    pub name: String,
    pub version: i32,
    pub context: Option<Value>,
    pub initiator: Option<String>,
    pub source_system: Option<String>,
    pub reason: Option<String>,
    pub tags: Option<Value>,
}

pub struct TaskInitializer<'a> {
    pool: PgPool,
    bus: Arc<EventBus>,
    identity_strategy: &'a dyn IdentityHashStrategy,
    identity_fields: &'a [String],
}

impl<'a> TaskInitializer<'a> {
    pub fn new(
        pool: PgPool,
        bus: Arc<EventBus>,
        identity_strategy: &'a dyn IdentityHashStrategy,
        identity_fields: &'a [String],
    ) -> Self {
        Self {
            pool,
            bus,
            identity_strategy,
            identity_fields,
        }
    }

    /// Dedup-by-identity-hash, template materialization, and enqueue, per
    /// §6's `submit_task` contract.
    pub async fn submit_task(&self, submission: TaskSubmission) -> TaskerResult<Uuid> {
        let named_task = NamedTask::find_by_natural_key(
            &self.pool,
            self.resolve_namespace_uuid(&submission.namespace).await?,
            &submission.name,
            submission.version,
        )
        .await?
        .ok_or_else(|| TaskerError::Validation {
            message: format!(
                "no named task {}/{}/v{}",
                submission.namespace, submission.name, submission.version
            ),
        })?;

        let identity_hash = self.compute_identity_hash(&submission);

        if let Some(existing) = Task::find_active_by_identity_hash(&self.pool, &identity_hash).await? {
            tracing::debug!(task_uuid = %existing.task_uuid, "submission deduplicated by identity hash");
            return Ok(existing.task_uuid);
        }

        let task_uuid = Uuid::now_v7();
        let task = Task::create(
            &self.pool,
            NewTask {
                task_uuid,
                named_task_uuid: named_task.named_task_uuid,
                context: submission.context,
                identity_hash,
                initiator: submission.initiator,
                source_system: submission.source_system,
                reason: submission.reason,
                tags: submission.tags,
                bypass_steps: None,
                correlation_id: Uuid::now_v7(),
            },
        )
        .await?;

        TaskTransition::create(
            &self.pool,
            NewTaskTransition {
                task_uuid: task.task_uuid,
                to_state: "pending".to_string(),
                from_state: None,
                metadata: None,
            },
        )
        .await?;

        self.materialize_step_graph(task.task_uuid, named_task.named_task_uuid).await?;

        self.bus.publish(&Event::TaskStartRequested { task_uuid: task.task_uuid });
        Ok(task.task_uuid)
    }

    async fn resolve_namespace_uuid(&self, namespace: &str) -> TaskerResult<Uuid> {
        tasker_shared::models::TaskNamespace::find_by_name(&self.pool, namespace)
            .await?
            .map(|ns| ns.task_namespace_uuid)
            .ok_or_else(|| TaskerError::Validation {
                message: format!("unknown task namespace {namespace}"),
            })
    }

    fn compute_identity_hash(&self, submission: &TaskSubmission) -> String {
        let name_value = Value::String(format!(
            "{}/{}/v{}",
            submission.namespace, submission.name, submission.version
        ));
        let initiator_value = submission.initiator.clone().map(Value::String);
        let source_system_value = submission.source_system.clone().map(Value::String);
        let reason_value = submission.reason.clone().map(Value::String);

        let field_values: Vec<(&str, Option<&Value>)> = self
            .identity_fields
            .iter()
            .map(|field| {
                let value = match field.as_str() {
                    "name" => Some(&name_value),
                    "context" => submission.context.as_ref(),
                    "initiator" => initiator_value.as_ref(),
                    "source_system" => source_system_value.as_ref(),
                    "reason" => reason_value.as_ref(),
                    "tags" => submission.tags.as_ref(),
                    _ => None,
                };
                (field.as_str(), value)
            })
            .collect();
        self.identity_strategy.hash(&field_values)
    }

    /// Instantiates one `WorkflowStep` per `NamedTasksNamedStep` link row.
    /// Edges are not templated independently in this data model: the link
    /// table carries only per-step defaults, not inter-step ordering, so a
    /// single-generation (no-edge) graph is materialized here; callers that
    /// need a DAG template add edges via `WorkflowStepEdge::create` after
    /// submission completes, before the first `process_task` tick observes
    /// them.
    async fn materialize_step_graph(&self, task_uuid: Uuid, named_task_uuid: Uuid) -> TaskerResult<()> {
        let links = NamedTasksNamedStep::find_for_named_task(&self.pool, named_task_uuid).await?;
        for link in links {
            let step = WorkflowStep::create(
                &self.pool,
                NewWorkflowStep {
                    workflow_step_uuid: Uuid::now_v7(),
                    task_uuid,
                    named_step_uuid: link.named_step_uuid,
                    retryable: link.default_retryable,
                    retry_limit: Some(link.default_retry_limit),
                    skippable: link.skippable,
                    inputs: None,
                },
            )
            .await?;

            tasker_shared::models::WorkflowStepTransition::create(
                &self.pool,
                tasker_shared::models::NewWorkflowStepTransition {
                    workflow_step_uuid: step.workflow_step_uuid,
                    to_state: "pending".to_string(),
                    from_state: None,
                    metadata: None,
                },
            )
            .await?;
        }
        Ok(())
    }
}
