//! Re-exports the shared error type under the orchestration crate's own name,
//! matching the teacher's `OrchestrationResult`/`OrchestrationError` split.

pub use tasker_shared::{TaskerError as OrchestrationError, TaskerResult as OrchestrationResult};
