//! Database-backed test data builders, gated behind `test-utils` (SPEC_FULL.md
//! §8 "Test tooling"). Grounded on the teacher's `WorkerTestFactory` builder
//! pattern: `.with_*()` setters, `.create(pool)` to persist.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    NamedStep, NamedTask, NamedTasksNamedStep, NewTask, NewWorkflowStep, Task, TaskNamespace,
    WorkflowStep,
};

pub async fn find_or_create_namespace(
    pool: &PgPool,
    name: &str,
) -> Result<TaskNamespace, sqlx::Error> {
    if let Some(existing) = TaskNamespace::find_by_name(pool, name).await? {
        return Ok(existing);
    }
    sqlx::query_as::<_, TaskNamespace>(
        "INSERT INTO tasker.task_namespaces (task_namespace_uuid, name) VALUES ($1, $2) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING task_namespace_uuid, name, description",
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .fetch_one(pool)
    .await
}

pub async fn find_or_create_dependent_system(
    pool: &PgPool,
    name: &str,
) -> Result<Uuid, sqlx::Error> {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO tasker.dependent_systems (dependent_system_uuid, name) VALUES ($1, $2) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING dependent_system_uuid",
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Builds a `NamedTask` (creating its namespace if needed).
pub struct NamedTaskFactory {
    namespace: String,
    name: String,
    version: i32,
}

impl NamedTaskFactory {
    pub fn new() -> Self {
        Self {
            namespace: "test_namespace".to_string(),
            name: "test_task".to_string(),
            version: 1,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub async fn create(self, pool: &PgPool) -> Result<NamedTask, sqlx::Error> {
        let namespace = find_or_create_namespace(pool, &self.namespace).await?;
        if let Some(existing) =
            NamedTask::find_by_natural_key(pool, namespace.task_namespace_uuid, &self.name, self.version)
                .await?
        {
            return Ok(existing);
        }
        sqlx::query_as::<_, NamedTask>(
            r#"
            INSERT INTO tasker.named_tasks (named_task_uuid, task_namespace_uuid, name, version)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(namespace.task_namespace_uuid)
        .bind(&self.name)
        .bind(self.version)
        .fetch_one(pool)
        .await
    }
}

impl Default for NamedTaskFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `NamedStep` plus its `NamedTasksNamedStep` link row.
pub struct NamedStepFactory {
    dependent_system: String,
    name: String,
    retry_limit: i32,
    retryable: bool,
}

impl NamedStepFactory {
    pub fn new() -> Self {
        Self {
            dependent_system: "test_system".to_string(),
            name: "test_step".to_string(),
            retry_limit: 3,
            retryable: true,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn retry_limit(mut self, limit: i32) -> Self {
        self.retry_limit = limit;
        self
    }

    pub async fn create_linked_to(
        self,
        pool: &PgPool,
        named_task_uuid: Uuid,
    ) -> Result<NamedStep, sqlx::Error> {
        let dependent_system_uuid = find_or_create_dependent_system(pool, &self.dependent_system).await?;
        let named_step = sqlx::query_as::<_, NamedStep>(
            "INSERT INTO tasker.named_steps (named_step_uuid, dependent_system_uuid, name) \
             VALUES ($1, $2, $3) ON CONFLICT (dependent_system_uuid, name) \
             DO UPDATE SET name = EXCLUDED.name RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(dependent_system_uuid)
        .bind(&self.name)
        .fetch_one(pool)
        .await?;

        sqlx::query_as::<_, NamedTasksNamedStep>(
            r#"
            INSERT INTO tasker.named_tasks_named_steps
                (named_tasks_named_steps_uuid, named_task_uuid, named_step_uuid, default_retryable, default_retry_limit)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (named_task_uuid, named_step_uuid) DO UPDATE SET default_retry_limit = EXCLUDED.default_retry_limit
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(named_task_uuid)
        .bind(named_step.named_step_uuid)
        .bind(self.retryable)
        .bind(self.retry_limit)
        .fetch_one(pool)
        .await?;

        Ok(named_step)
    }
}

impl Default for NamedStepFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a bare `Task` row with no steps. Chain with `WorkflowStepFactory`
/// to add steps and edges.
pub struct TaskFactory {
    named_task_uuid: Option<Uuid>,
    context: Option<Value>,
}

impl TaskFactory {
    pub fn new() -> Self {
        Self {
            named_task_uuid: None,
            context: None,
        }
    }

    pub fn for_named_task(mut self, named_task_uuid: Uuid) -> Self {
        self.named_task_uuid = Some(named_task_uuid);
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub async fn create(self, pool: &PgPool) -> Result<Task, sqlx::Error> {
        let named_task_uuid = match self.named_task_uuid {
            Some(id) => id,
            None => NamedTaskFactory::new().create(pool).await?.named_task_uuid,
        };
        let task_uuid = Uuid::now_v7();
        Task::create(
            pool,
            NewTask {
                task_uuid,
                named_task_uuid,
                context: self.context,
                identity_hash: format!("test-{task_uuid}"),
                initiator: Some("test_factory".to_string()),
                source_system: Some("test".to_string()),
                reason: Some("factory-created".to_string()),
                tags: None,
                bypass_steps: None,
                correlation_id: Uuid::now_v7(),
            },
        )
        .await
    }
}

impl Default for TaskFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `WorkflowStep` for an existing task.
pub struct WorkflowStepFactory {
    named_step_uuid: Option<Uuid>,
    retryable: bool,
    retry_limit: Option<i32>,
}

impl WorkflowStepFactory {
    pub fn new() -> Self {
        Self {
            named_step_uuid: None,
            retryable: true,
            retry_limit: None,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn retry_limit(mut self, limit: i32) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    pub async fn create_for_task(
        self,
        pool: &PgPool,
        task_uuid: Uuid,
    ) -> Result<WorkflowStep, sqlx::Error> {
        let named_step_uuid = match self.named_step_uuid {
            Some(id) => id,
            None => {
                let task = Task::find_by_id(pool, task_uuid)
                    .await?
                    .expect("task must exist before attaching steps");
                NamedStepFactory::new()
                    .name(format!("step-{}", Uuid::now_v7()))
                    .create_linked_to(pool, task.named_task_uuid)
                    .await?
                    .named_step_uuid
            }
        };

        WorkflowStep::create(
            pool,
            NewWorkflowStep {
                workflow_step_uuid: Uuid::now_v7(),
                task_uuid,
                named_step_uuid,
                retryable: self.retryable,
                retry_limit: self.retry_limit,
                skippable: false,
                inputs: None,
            },
        )
        .await
    }
}

impl Default for WorkflowStepFactory {
    fn default() -> Self {
        Self::new()
    }
}
