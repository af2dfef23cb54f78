//! Step State Machine (C5). SPEC_FULL.md §4.2.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{TaskerError, TaskerResult};
use crate::models::workflow_step_transition::{NewWorkflowStepTransition, WorkflowStepTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepState {
    Pending,
    InProgress,
    Complete,
    Error,
    ResolvedManually,
    Cancelled,
}

impl StepState {
    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::InProgress => "in_progress",
            StepState::Complete => "complete",
            StepState::Error => "error",
            StepState::ResolvedManually => "resolved_manually",
            StepState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<StepState> {
        match s {
            "pending" => Some(StepState::Pending),
            "in_progress" => Some(StepState::InProgress),
            "complete" => Some(StepState::Complete),
            "error" => Some(StepState::Error),
            "resolved_manually" => Some(StepState::ResolvedManually),
            "cancelled" => Some(StepState::Cancelled),
            _ => None,
        }
    }

    /// Once `processed = true` the step's state is always terminal (§3
    /// invariant 4): `complete` or `resolved_manually`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Complete | StepState::ResolvedManually | StepState::Cancelled
        )
    }
}

#[derive(Debug, Clone)]
pub enum StepEvent {
    Dispatch,
    Complete,
    Fail,
    /// Operator- or backoff-driven retry from `error`.
    Retry,
    Cancel,
    ResolveManually,
}

impl StepEvent {
    fn target_state(&self) -> StepState {
        match self {
            StepEvent::Dispatch | StepEvent::Retry => StepState::InProgress,
            StepEvent::Complete => StepState::Complete,
            StepEvent::Fail => StepState::Error,
            StepEvent::Cancel => StepState::Cancelled,
            StepEvent::ResolveManually => StepState::ResolvedManually,
        }
    }
}

/// Legal transition table from §4.2:
/// `pending -> in_progress`; `in_progress -> complete`; `in_progress -> error`;
/// `error -> in_progress`; any non-terminal -> `cancelled` or `resolved_manually`.
fn is_legal(from: StepState, to: StepState) -> bool {
    if matches!(to, StepState::Cancelled | StepState::ResolvedManually) {
        return !from.is_terminal();
    }
    matches!(
        (from, to),
        (StepState::Pending, StepState::InProgress)
            | (StepState::InProgress, StepState::Complete)
            | (StepState::InProgress, StepState::Error)
            | (StepState::Error, StepState::InProgress)
    )
}

pub struct StepStateMachine {
    workflow_step_uuid: Uuid,
    pool: PgPool,
}

impl StepStateMachine {
    pub fn new(workflow_step_uuid: Uuid, pool: PgPool) -> Self {
        Self {
            workflow_step_uuid,
            pool,
        }
    }

    pub async fn current_state(&self) -> TaskerResult<StepState> {
        let current =
            WorkflowStepTransition::current_for_step(&self.pool, self.workflow_step_uuid).await?;
        let state_str = current
            .map(|t| t.to_state)
            .unwrap_or_else(|| "pending".to_string());
        StepState::parse(&state_str).ok_or_else(|| {
            TaskerError::Infrastructure(sqlx::Error::Decode(
                format!("unknown step state {state_str}").into(),
            ))
        })
    }

    pub async fn transition(&mut self, event: StepEvent) -> TaskerResult<StepState> {
        self.transition_with_metadata(event, None).await
    }

    pub async fn transition_with_metadata(
        &mut self,
        event: StepEvent,
        metadata: Option<Value>,
    ) -> TaskerResult<StepState> {
        let from = self.current_state().await?;
        let to = event.target_state();

        if !is_legal(from, to) {
            return Err(TaskerError::InvalidStateTransition {
                entity_type: "WorkflowStep",
                entity_id: self.workflow_step_uuid,
                from_state: from.as_str().to_string(),
                to_state: to.as_str().to_string(),
            });
        }

        WorkflowStepTransition::create(
            &self.pool,
            NewWorkflowStepTransition {
                workflow_step_uuid: self.workflow_step_uuid,
                to_state: to.as_str().to_string(),
                from_state: Some(from.as_str().to_string()),
                metadata,
            },
        )
        .await?;

        Ok(to)
    }
}
