//! The handler interface (SPEC_FULL.md §6 "Handler interface").
//!
//! User-authored handler bodies are explicitly out of scope (spec.md §1);
//! this module only defines the contract the Step Executor (C8) calls
//! through, and the tagged result type that replaces exception-for-control-flow
//! (§9 design note).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What a handler invocation produced. Explicit and tagged rather than
/// "return value or raised error", per §9's guidance to replace
/// exception-for-control-flow with a tagged result.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Success(Option<Value>),
    Failure {
        message: String,
        retryable: bool,
        backoff_request_seconds: Option<i64>,
    },
}

/// Descriptor for a custom event a handler may emit; returned by
/// `custom_event_configuration`. Opaque to the CORE beyond name/description —
/// interpreted by observability tooling outside this crate's scope.
#[derive(Debug, Clone)]
pub struct CustomEventDescriptor {
    pub name: String,
    pub description: String,
}

/// A registered handler exposes these two callables (§6). `(namespace, name,
/// version)` is the lookup key maintained by the registry that owns instances
/// of this trait.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// May be empty. Any error here fails registration atomically: neither
    /// the handler nor any of its events may appear in the registry (§6).
    fn custom_event_configuration(&self) -> Result<Vec<CustomEventDescriptor>, String> {
        Ok(Vec::new())
    }

    /// Invoked once per step dispatch. `parent_results` is keyed by the
    /// parent step's `workflow_step_uuid`. `cancellation` is cooperative only
    /// — honoring it is handler-dependent (§5).
    async fn handle(
        &self,
        context: Option<Value>,
        step_inputs: Option<Value>,
        parent_results: HashMap<Uuid, Option<Value>>,
        cancellation: CancellationToken,
    ) -> HandlerOutcome;
}
