//! `NamedTask`: a `(namespace, name, version)`-keyed handler binding.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct NamedTask {
    pub named_task_uuid: Uuid,
    pub task_namespace_uuid: Uuid,
    pub name: String,
    pub version: i32,
    pub configuration: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NamedTask {
    pub async fn find_by_natural_key(
        pool: &sqlx::PgPool,
        task_namespace_uuid: Uuid,
        name: &str,
        version: i32,
    ) -> Result<Option<NamedTask>, sqlx::Error> {
        sqlx::query_as::<_, NamedTask>(
            "SELECT * FROM tasker.named_tasks \
             WHERE task_namespace_uuid = $1 AND name = $2 AND version = $3",
        )
        .bind(task_namespace_uuid)
        .bind(name)
        .bind(version)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        named_task_uuid: Uuid,
    ) -> Result<Option<NamedTask>, sqlx::Error> {
        sqlx::query_as::<_, NamedTask>("SELECT * FROM tasker.named_tasks WHERE named_task_uuid = $1")
            .bind(named_task_uuid)
            .fetch_optional(pool)
            .await
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskNamespace {
    pub task_namespace_uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl TaskNamespace {
    pub async fn find_by_name(
        pool: &sqlx::PgPool,
        name: &str,
    ) -> Result<Option<TaskNamespace>, sqlx::Error> {
        sqlx::query_as::<_, TaskNamespace>("SELECT * FROM tasker.task_namespaces WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await
    }
}
