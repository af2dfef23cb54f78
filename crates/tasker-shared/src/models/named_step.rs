//! `NamedStep`: a reusable step definition owned by a `DependentSystem`.

use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct NamedStep {
    pub named_step_uuid: Uuid,
    pub dependent_system_uuid: Uuid,
    pub name: String,
}

impl NamedStep {
    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        named_step_uuid: Uuid,
    ) -> Result<Option<NamedStep>, sqlx::Error> {
        sqlx::query_as::<_, NamedStep>("SELECT * FROM tasker.named_steps WHERE named_step_uuid = $1")
            .bind(named_step_uuid)
            .fetch_optional(pool)
            .await
    }
}

/// Link row carrying per-task-step defaults for a `(NamedTask, NamedStep)` pair.
#[derive(Debug, Clone, FromRow)]
pub struct NamedTasksNamedStep {
    pub named_tasks_named_steps_uuid: Uuid,
    pub named_task_uuid: Uuid,
    pub named_step_uuid: Uuid,
    pub skippable: bool,
    pub default_retryable: bool,
    pub default_retry_limit: i32,
}

impl NamedTasksNamedStep {
    pub async fn find_for_named_task(
        pool: &sqlx::PgPool,
        named_task_uuid: Uuid,
    ) -> Result<Vec<NamedTasksNamedStep>, sqlx::Error> {
        sqlx::query_as::<_, NamedTasksNamedStep>(
            "SELECT * FROM tasker.named_tasks_named_steps WHERE named_task_uuid = $1",
        )
        .bind(named_task_uuid)
        .fetch_all(pool)
        .await
    }
}
