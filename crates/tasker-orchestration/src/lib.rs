//! `tasker-orchestration` — the CORE: Readiness Oracle, Execution Context
//! Aggregator, Viable Step Discovery, Step Executor, Task Finalizer,
//! Reenqueuer, Event Bus, and the Orchestration Coordinator that wires them.

pub mod aggregator;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod events;
pub mod executor;
pub mod finalizer;
pub mod initializer;
pub mod readiness;
pub mod reenqueue;
pub mod registry;

pub use error::{OrchestrationError, OrchestrationResult};
