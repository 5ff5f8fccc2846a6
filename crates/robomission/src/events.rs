//! Broadcast bus for state-change and inspection notifications.
//!
//! Publishing never blocks and never fails: with no subscriber the event is dropped.

use crate::machine::State;
use crate::model::{InspectionId, Mission, MissionId, TaskId, TaskStatus};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StateChanged {
        from: State,
        to: State,
        mission_id: Option<MissionId>,
    },
    MissionStarted {
        mission_id: MissionId,
        name: String,
        total_tasks: usize,
    },
    TaskStarted {
        mission_id: MissionId,
        task_id: TaskId,
        /// 1-based position in the mission.
        index: usize,
        kind: String,
    },
    TaskRetrying {
        mission_id: MissionId,
        task_id: TaskId,
        attempt: u32,
        reason: String,
    },
    TaskFinished {
        mission_id: MissionId,
        task_id: TaskId,
        status: TaskStatus,
    },
    MissionFinished {
        mission: Box<Mission>,
    },
    InspectionQueued {
        mission_id: MissionId,
        inspection_id: InspectionId,
    },
    InspectionStored {
        mission_id: MissionId,
        inspection_id: InspectionId,
        handler: String,
        location: String,
    },
    InspectionFailed {
        mission_id: MissionId,
        inspection_id: InspectionId,
        handler: String,
        error: String,
    },
}

#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}
