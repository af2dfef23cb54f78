//! Database pool construction and migration runner.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::error::TaskerResult;

/// Embeds the crate's `migrations/` directory at compile time, mirroring the
/// teacher's `tasker_shared::database::migrator::MIGRATOR` convention used
/// throughout its `#[sqlx::test(migrator = ...)]` fixtures.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

pub async fn connect(config: &DatabaseConfig) -> TaskerResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> TaskerResult<()> {
    MIGRATOR.run(pool).await.map_err(|e| {
        crate::error::TaskerError::Infrastructure(sqlx::Error::Migrate(Box::new(e)))
    })
}
