//! Error taxonomy for the workflow engine.
//!
//! One enum covers every semantic kind named in the specification: callers
//! match on variant, not on string content. `Infrastructure` folds in any
//! `sqlx::Error` that isn't a recognized unique-violation on a transition
//! table (those are translated to `ConcurrencyConflict` at the call site).

use thiserror::Error;
use uuid::Uuid;

pub type TaskerResult<T> = Result<T, TaskerError>;

#[derive(Debug, Error)]
pub enum TaskerError {
    /// Caller-supplied input violates a schema or required invariant. Nothing
    /// is persisted.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Attempted to move an entity along a transition edge that the state
    /// machine does not allow. Indicates a bug in the caller.
    #[error("invalid state transition for {entity_type} {entity_id}: {from_state} -> {to_state}")]
    InvalidStateTransition {
        entity_type: &'static str,
        entity_id: Uuid,
        from_state: String,
        to_state: String,
    },

    /// Lost a CAS on `in_process` or the transition `most_recent` uniqueness
    /// index. Recoverable: the caller rereads state and retries or abandons.
    #[error("concurrency conflict on {entity_type} {entity_id}")]
    ConcurrencyConflict {
        entity_type: &'static str,
        entity_id: Uuid,
    },

    /// A step handler raised. `retryable` reflects the ladder evaluation at
    /// the moment of failure (retry_limit/retryable flag), not a final verdict.
    #[error("handler failed for step {step_id}: {message}")]
    HandlerFailed {
        step_id: Uuid,
        message: String,
        retryable: bool,
        backoff_request_seconds: Option<i64>,
    },

    /// Database unreachable, or any other infrastructure-level failure. No
    /// state changes occurred.
    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] sqlx::Error),

    /// `custom_event_configuration` raised during handler registration; the
    /// whole registration is rolled back.
    #[error("registration error for handler {namespace}/{name}/v{version}: {message}")]
    Registration {
        namespace: String,
        name: String,
        version: i32,
        message: String,
    },

    /// A referenced entity (task, step, named task...) does not exist.
    #[error("{entity_type} {entity_id} not found")]
    NotFound {
        entity_type: &'static str,
        entity_id: Uuid,
    },
}

impl TaskerError {
    /// `true` for the subset of errors a caller may retry without
    /// investigation (lost races); `false` for everything else.
    pub fn is_recoverable_conflict(&self) -> bool {
        matches!(self, TaskerError::ConcurrencyConflict { .. })
    }
}
