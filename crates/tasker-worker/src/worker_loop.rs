//! The in-process worker loop: periodically finds non-terminal tasks and
//! drives them through the Coordinator's `process_task`. This is the "pulls
//! viable steps and invokes handlers" runtime named in §1 — in practice it
//! pulls *tasks*, and lets the Coordinator's own Discovery/Executor pull the
//! viable steps within each tick.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tasker_orchestration::coordinator::OrchestrationCoordinator;

pub struct WorkerLoop {
    pool: PgPool,
    coordinator: Arc<OrchestrationCoordinator>,
    poll_interval: Duration,
}

impl WorkerLoop {
    pub fn new(pool: PgPool, coordinator: Arc<OrchestrationCoordinator>, poll_interval: Duration) -> Self {
        Self {
            pool,
            coordinator,
            poll_interval,
        }
    }

    /// Runs until `cancellation` fires. Each iteration ticks every
    /// non-terminal task once; a task awaiting backoff simply produces a
    /// `NoOp`/`Reenqueued` action and is picked up again next poll or by its
    /// own Reenqueuer wake-up, whichever comes first.
    pub async fn run(&self, cancellation: CancellationToken) {
        loop {
            if cancellation.is_cancelled() {
                return;
            }

            match self.non_terminal_task_ids().await {
                Ok(task_uuids) => {
                    for task_uuid in task_uuids {
                        if let Err(err) = self.coordinator.process_task(task_uuid).await {
                            tracing::error!(%task_uuid, error = %err, "tick failed");
                        }
                    }
                }
                Err(err) => tracing::error!(error = %err, "failed to list non-terminal tasks"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancellation.cancelled() => return,
            }
        }
    }

    async fn non_terminal_task_ids(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT t.task_uuid
            FROM tasker.tasks t
            LEFT JOIN tasker.task_transitions tt
                ON tt.task_uuid = t.task_uuid AND tt.most_recent
            WHERE COALESCE(tt.to_state, 'pending') NOT IN ('complete', 'error', 'cancelled')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
