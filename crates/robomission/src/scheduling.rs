//! Entry point used by the outside world to start and stop missions.

use crate::error::RejectionError;
use crate::machine::{State, StateMachineHandle};
use crate::mission_source::{MissionDefinition, MissionSource};
use crate::model::{Mission, MissionId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Answer to an accepted start request. Execution continues in the background.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StartAccepted {
    pub mission_id: MissionId,
    pub definition_id: Option<String>,
    pub name: String,
    pub tasks: usize,
}

impl StartAccepted {
    fn for_mission(mission: &Mission) -> Self {
        Self {
            mission_id: mission.id,
            definition_id: mission.definition_id.clone(),
            name: mission.name.clone(),
            tasks: mission.tasks.len(),
        }
    }
}

#[derive(Clone)]
pub struct SchedulingUtilities {
    source: Arc<dyn MissionSource>,
    machine: StateMachineHandle,
}

impl SchedulingUtilities {
    pub fn new(source: Arc<dyn MissionSource>, machine: StateMachineHandle) -> Self {
        Self { source, machine }
    }

    /// Load predefined mission `id` and hand it to the state machine.
    pub async fn start_mission(&self, id: &str) -> Result<StartAccepted, RejectionError> {
        let mission = self.source.load_mission(id).map_err(|err| {
            warn!(definition = id, error = %err, "mission definition rejected");
            RejectionError::from(err)
        })?;
        self.schedule(mission).await
    }

    /// Start an ad-hoc definition that is not part of the mission source.
    pub async fn start_mission_definition(
        &self,
        definition: &MissionDefinition,
    ) -> Result<StartAccepted, RejectionError> {
        let fallback = definition.id.clone().unwrap_or_else(|| "adhoc".to_string());
        self.schedule(definition.to_mission(&fallback)).await
    }

    async fn schedule(&self, mission: Mission) -> Result<StartAccepted, RejectionError> {
        let accepted = StartAccepted::for_mission(&mission);
        match self.machine.schedule(mission).await {
            Ok(_) => {
                info!(
                    mission_id = %accepted.mission_id,
                    definition = ?accepted.definition_id,
                    "mission scheduled"
                );
                Ok(accepted)
            }
            Err(err) => {
                warn!(error = %err, "mission not scheduled");
                Err(err)
            }
        }
    }

    /// Request a stop of the active mission.
    pub async fn stop_mission(&self) -> Result<MissionId, RejectionError> {
        self.machine.stop().await
    }

    #[must_use]
    pub fn current_state(&self) -> State {
        self.machine.current_state()
    }

    #[must_use]
    pub fn current_mission(&self) -> Option<Mission> {
        self.machine.current_mission()
    }

    #[must_use]
    pub fn machine(&self) -> &StateMachineHandle {
        &self.machine
    }
}
