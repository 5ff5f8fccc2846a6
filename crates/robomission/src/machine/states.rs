use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state of the mission state machine.
///
/// `Idle` is the only state in which a new mission is accepted, and every
/// other state eventually leads back to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    Idle,
    /// Mission accepted; the robot is being prepared.
    Initiate,
    /// A task is executing on the robot.
    Running,
    /// Between tasks: the next one is chosen or the mission is finalized.
    AwaitingNextTask,
    /// The robot is being told to stop after a cancel or a fatal failure.
    StoppingMission,
}

impl State {
    #[must_use]
    pub fn allowed_transitions(&self) -> &'static [State] {
        match self {
            Self::Idle => &[Self::Initiate],
            Self::Initiate => &[Self::Running, Self::StoppingMission, Self::Idle],
            Self::Running => &[Self::AwaitingNextTask, Self::StoppingMission],
            Self::AwaitingNextTask => &[Self::Running, Self::StoppingMission, Self::Idle],
            Self::StoppingMission => &[Self::Idle],
        }
    }

    #[must_use]
    pub fn can_transition_to(&self, target: State) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// True while a mission is held by the machine.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Initiate => "initiate",
            Self::Running => "running",
            Self::AwaitingNextTask => "awaiting_next_task",
            Self::StoppingMission => "stopping_mission",
        };
        write!(f, "{s}")
    }
}
