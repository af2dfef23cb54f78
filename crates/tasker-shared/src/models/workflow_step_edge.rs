//! The `WorkflowStepEdge` entity: a directed dependency edge within one task.

use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct WorkflowStepEdge {
    pub workflow_step_edge_uuid: Uuid,
    pub task_uuid: Uuid,
    pub from_step_uuid: Uuid,
    pub to_step_uuid: Uuid,
    pub name: Option<String>,
}

impl WorkflowStepEdge {
    pub async fn create(
        pool: &sqlx::PgPool,
        task_uuid: Uuid,
        from_step_uuid: Uuid,
        to_step_uuid: Uuid,
        name: Option<String>,
    ) -> Result<WorkflowStepEdge, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStepEdge>(
            r#"
            INSERT INTO tasker.workflow_step_edges
                (workflow_step_edge_uuid, task_uuid, from_step_uuid, to_step_uuid, name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(task_uuid)
        .bind(from_step_uuid)
        .bind(to_step_uuid)
        .bind(name)
        .fetch_one(pool)
        .await
    }

    pub async fn find_for_task(
        pool: &sqlx::PgPool,
        task_uuid: Uuid,
    ) -> Result<Vec<WorkflowStepEdge>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStepEdge>(
            "SELECT * FROM tasker.workflow_step_edges WHERE task_uuid = $1",
        )
        .bind(task_uuid)
        .fetch_all(pool)
        .await
    }
}
