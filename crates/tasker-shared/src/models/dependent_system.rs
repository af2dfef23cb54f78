//! `DependentSystem`: the uniquely-named owner of a `NamedStep` (§3 item 5),
//! used to trace which external system a step concerns.

use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DependentSystem {
    pub dependent_system_uuid: Uuid,
    pub name: String,
}

impl DependentSystem {
    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        dependent_system_uuid: Uuid,
    ) -> Result<Option<DependentSystem>, sqlx::Error> {
        sqlx::query_as::<_, DependentSystem>(
            "SELECT * FROM tasker.dependent_systems WHERE dependent_system_uuid = $1",
        )
        .bind(dependent_system_uuid)
        .fetch_optional(pool)
        .await
    }
}
