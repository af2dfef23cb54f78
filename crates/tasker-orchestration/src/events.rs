//! Event Bus (C11): a synchronous, registration-ordered, process-local topic
//! broker (§4.9). No async dispatch — a subscriber that needs to do I/O
//! spawns its own task, keeping delivery non-blocking relative to the
//! database per §5.

use std::sync::RwLock;
use uuid::Uuid;

/// The exhaustive topic list from §4.9. One variant per topic; fields carry
/// exactly what that topic's subscribers need.
#[derive(Debug, Clone)]
pub enum Event {
    TaskStartRequested { task_uuid: Uuid },
    TaskStarted { task_uuid: Uuid },
    ViableStepsDiscovered { task_uuid: Uuid, step_uuids: Vec<Uuid> },
    NoViableSteps { task_uuid: Uuid },
    StepExecutionRequested { task_uuid: Uuid, step_uuid: Uuid },
    StepCompleted { task_uuid: Uuid, step_uuid: Uuid, attempt_number: i32 },
    StepFailed { task_uuid: Uuid, step_uuid: Uuid, attempt_number: i32 },
    TaskFinalizationRequested { task_uuid: Uuid },
    TaskCompleted { task_uuid: Uuid },
    TaskFailed { task_uuid: Uuid },
    TaskReenqueueRequested { task_uuid: Uuid, delay_seconds: i64 },
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::TaskStartRequested { .. } => "task.start_requested",
            Event::TaskStarted { .. } => "task.started",
            Event::ViableStepsDiscovered { .. } => "workflow.viable_steps_discovered",
            Event::NoViableSteps { .. } => "workflow.no_viable_steps",
            Event::StepExecutionRequested { .. } => "step.execution_requested",
            Event::StepCompleted { .. } => "step.completed",
            Event::StepFailed { .. } => "step.failed",
            Event::TaskFinalizationRequested { .. } => "task.finalization_requested",
            Event::TaskCompleted { .. } => "task.completed",
            Event::TaskFailed { .. } => "task.failed",
            Event::TaskReenqueueRequested { .. } => "task.reenqueue_requested",
        }
    }
}

type Subscriber = Box<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(&'static str, Subscriber)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a subscriber for `topic`. Registration order is delivery
    /// order for that topic (§4.9); the Coordinator registers all
    /// subscribers once at boot.
    pub fn subscribe<F>(&self, topic: &'static str, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .expect("event bus subscriber lock poisoned")
            .push((topic, Box::new(handler)));
    }

    pub fn publish(&self, event: &Event) {
        let topic = event.topic();
        let subscribers = self.subscribers.read().expect("event bus subscriber lock poisoned");
        for (sub_topic, handler) in subscribers.iter() {
            if *sub_topic == topic {
                handler(event);
            }
        }
    }
}
