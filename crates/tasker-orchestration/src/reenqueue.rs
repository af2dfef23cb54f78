//! Reenqueuer (C10): schedules a future wake-up for a task whose next
//! readiness moment lies in the future. §4.8 leaves the mechanism abstract;
//! two implementations ship here behind a shared trait so the Finalizer is
//! decoupled from the scheduling mechanism.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use uuid::Uuid;

#[async_trait]
pub trait Reenqueuer: Send + Sync {
    /// Idempotent at the task level (§4.8): duplicate schedules for the
    /// same `task_uuid` collapse.
    async fn schedule(&self, task_uuid: Uuid, delay: Duration);
}

/// Wakes the given closure after `delay`, deduping in-flight schedules for
/// the same task via a `dashmap`-backed set so a storm of Finalizer calls
/// for one stuck task does not spawn a pile of redundant sleepers.
pub struct InProcessReenqueuer<F>
where
    F: Fn(Uuid) + Send + Sync + 'static,
{
    in_flight: Arc<DashSet<Uuid>>,
    on_wake: Arc<F>,
}

impl<F> InProcessReenqueuer<F>
where
    F: Fn(Uuid) + Send + Sync + 'static,
{
    pub fn new(on_wake: F) -> Self {
        Self {
            in_flight: Arc::new(DashSet::new()),
            on_wake: Arc::new(on_wake),
        }
    }
}

#[async_trait]
impl<F> Reenqueuer for InProcessReenqueuer<F>
where
    F: Fn(Uuid) + Send + Sync + 'static,
{
    async fn schedule(&self, task_uuid: Uuid, delay: Duration) {
        if !self.in_flight.insert(task_uuid) {
            tracing::debug!(%task_uuid, "reenqueue already scheduled, collapsing duplicate");
            return;
        }

        let in_flight = self.in_flight.clone();
        let on_wake = self.on_wake.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            in_flight.remove(&task_uuid);
            on_wake(task_uuid);
        });
    }
}

/// Records calls without sleeping, for tests that assert the Finalizer
/// chose to reenqueue without waiting out a real delay.
#[derive(Default)]
pub struct NullReenqueuer {
    pub calls: std::sync::Mutex<Vec<(Uuid, Duration)>>,
}

impl NullReenqueuer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Reenqueuer for NullReenqueuer {
    async fn schedule(&self, task_uuid: Uuid, delay: Duration) {
        self.calls.lock().expect("NullReenqueuer lock poisoned").push((task_uuid, delay));
    }
}
