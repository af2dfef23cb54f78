//! Task State Machine (C6). SPEC_FULL.md §4.2.
//!
//! Holds only an id and a pool handle — never a back-pointer into the `Task`
//! row — so the machine can be constructed cheaply wherever a transition is
//! needed (§9's "entity id + store handle" pattern).

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{TaskerError, TaskerResult};
use crate::models::task::Task;
use crate::models::task_transition::{NewTaskTransition, TaskTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    InProgress,
    Complete,
    Error,
    Cancelled,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Complete => "complete",
            TaskState::Error => "error",
            TaskState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<TaskState> {
        match s {
            "pending" => Some(TaskState::Pending),
            "in_progress" => Some(TaskState::InProgress),
            "complete" => Some(TaskState::Complete),
            "error" => Some(TaskState::Error),
            "cancelled" => Some(TaskState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub enum TaskEvent {
    Start,
    Complete,
    Fail,
    Cancel,
    /// Operator-initiated retry of an errored task.
    Retry,
}

impl TaskEvent {
    fn target_state(&self) -> TaskState {
        match self {
            TaskEvent::Start | TaskEvent::Retry => TaskState::InProgress,
            TaskEvent::Complete => TaskState::Complete,
            TaskEvent::Fail => TaskState::Error,
            TaskEvent::Cancel => TaskState::Cancelled,
        }
    }
}

/// Legal transition table from §4.2: `pending -> in_progress`;
/// `in_progress -> {complete, error, cancelled}`; `error -> in_progress`.
fn is_legal(from: TaskState, to: TaskState) -> bool {
    matches!(
        (from, to),
        (TaskState::Pending, TaskState::InProgress)
            | (TaskState::InProgress, TaskState::Complete)
            | (TaskState::InProgress, TaskState::Error)
            | (TaskState::InProgress, TaskState::Cancelled)
            | (TaskState::Error, TaskState::InProgress)
    )
}

pub struct TaskStateMachine {
    task_uuid: Uuid,
    pool: PgPool,
}

impl TaskStateMachine {
    pub fn new(task_uuid: Uuid, pool: PgPool) -> Self {
        Self { task_uuid, pool }
    }

    pub async fn for_task(task_uuid: Uuid, pool: PgPool) -> TaskerResult<Self> {
        Ok(Self { task_uuid, pool })
    }

    /// Current state from the most-recent transition; `pending` if the task
    /// has no transitions yet (true only transiently, inside the creation
    /// transaction).
    pub async fn current_state(&self) -> TaskerResult<TaskState> {
        let current = TaskTransition::current_for_task(&self.pool, self.task_uuid).await?;
        let state_str = current.map(|t| t.to_state).unwrap_or_else(|| "pending".to_string());
        TaskState::parse(&state_str).ok_or_else(|| TaskerError::Infrastructure(sqlx::Error::Decode(
            format!("unknown task state {state_str}").into(),
        )))
    }

    /// Applies `event`, writing a transition row and the `complete` mirror
    /// column. Returns `InvalidStateTransition` without touching storage if
    /// the edge is not legal.
    pub async fn transition(&mut self, event: TaskEvent) -> TaskerResult<TaskState> {
        let from = self.current_state().await?;
        let to = event.target_state();

        if !is_legal(from, to) {
            return Err(TaskerError::InvalidStateTransition {
                entity_type: "Task",
                entity_id: self.task_uuid,
                from_state: from.as_str().to_string(),
                to_state: to.as_str().to_string(),
            });
        }

        self.write_transition(from, to, None).await?;
        Ok(to)
    }

    async fn write_transition(
        &self,
        from: TaskState,
        to: TaskState,
        metadata: Option<Value>,
    ) -> TaskerResult<()> {
        TaskTransition::create(
            &self.pool,
            NewTaskTransition {
                task_uuid: self.task_uuid,
                to_state: to.as_str().to_string(),
                from_state: Some(from.as_str().to_string()),
                metadata,
            },
        )
        .await?;

        Task::mark_complete(&self.pool, self.task_uuid, to == TaskState::Complete).await?;
        Ok(())
    }
}
