//! State machines for tasks (C6) and steps (C5). SPEC_FULL.md §4.2.

pub mod step;
pub mod task;

pub use step::{StepEvent, StepState, StepStateMachine};
pub use task::{TaskEvent, TaskState, TaskStateMachine};
