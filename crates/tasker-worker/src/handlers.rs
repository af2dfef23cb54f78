//! Concrete `StepHandler` implementations shipped with this repository.
//! These are the "registered collaborator" handlers referenced by §1 — the
//! CORE only calls through the trait, never these types directly.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tasker_shared::handler::{HandlerOutcome, StepHandler};

/// Echoes its inputs back as the step result. Useful for smoke-testing a
/// DAG's shape without writing a domain-specific handler.
pub struct EchoHandler;

#[async_trait]
impl StepHandler for EchoHandler {
    async fn handle(
        &self,
        _context: Option<Value>,
        step_inputs: Option<Value>,
        _parent_results: HashMap<Uuid, Option<Value>>,
        _cancellation: CancellationToken,
    ) -> HandlerOutcome {
        HandlerOutcome::Success(step_inputs)
    }
}

/// Fails every invocation, optionally requesting an explicit backoff.
/// Exists for exercising the retry ladder in tests and demos without a
/// flaky real dependency.
pub struct AlwaysFailHandler {
    pub retryable: bool,
    pub backoff_request_seconds: Option<i64>,
}

#[async_trait]
impl StepHandler for AlwaysFailHandler {
    async fn handle(
        &self,
        _context: Option<Value>,
        _step_inputs: Option<Value>,
        _parent_results: HashMap<Uuid, Option<Value>>,
        _cancellation: CancellationToken,
    ) -> HandlerOutcome {
        HandlerOutcome::Failure {
            message: "AlwaysFailHandler: simulated failure".to_string(),
            retryable: self.retryable,
            backoff_request_seconds: self.backoff_request_seconds,
        }
    }
}
