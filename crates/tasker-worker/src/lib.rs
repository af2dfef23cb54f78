//! `tasker-worker` — concrete `StepHandler` implementations and the
//! in-process worker loop that drives tasks to completion against a
//! configured Postgres database.

pub mod handlers;
pub mod worker_loop;

pub use worker_loop::WorkerLoop;
