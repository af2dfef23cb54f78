//! Viable Step Discovery (C7): wraps the Oracle to yield the dispatchable
//! subset for one task and emits the corresponding bus events.

use uuid::Uuid;

use tasker_shared::error::TaskerResult;

use crate::events::{Event, EventBus};
use crate::readiness::ReadinessOracle;

pub struct ViableStepDiscovery<'a> {
    oracle: &'a ReadinessOracle<'a>,
    bus: &'a EventBus,
}

impl<'a> ViableStepDiscovery<'a> {
    pub fn new(oracle: &'a ReadinessOracle<'a>, bus: &'a EventBus) -> Self {
        Self { oracle, bus }
    }

    /// Returns the ready `workflow_step_uuid`s for `task_uuid`, emitting
    /// `workflow.viable_steps_discovered` always, and
    /// `workflow.no_viable_steps` additionally when the list is empty.
    pub async fn discover(&self, task_uuid: Uuid) -> TaskerResult<Vec<Uuid>> {
        let rows = self.oracle.readiness_for(task_uuid, None).await?;
        let viable: Vec<Uuid> = rows
            .into_iter()
            .filter(|r| r.ready_for_execution)
            .map(|r| r.workflow_step_uuid)
            .collect();

        self.bus.publish(&Event::ViableStepsDiscovered {
            task_uuid,
            step_uuids: viable.clone(),
        });
        if viable.is_empty() {
            self.bus.publish(&Event::NoViableSteps { task_uuid });
        }
        Ok(viable)
    }
}
