//! `tasker-shared` — persisted entities, transitions, state machines, error
//! taxonomy, configuration, and the handler contract shared by the
//! orchestration core and worker runtime.

pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod identity;
pub mod models;
pub mod state_machine;

#[cfg(feature = "test-utils")]
pub mod test_factories;

pub use error::{TaskerError, TaskerResult};
