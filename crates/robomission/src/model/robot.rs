use crate::error::TaskFailure;
use crate::model::{CapturedArtifact, MissionStatus, Pose, TaskId};
use serde::{Deserialize, Serialize};

/// Coarse availability reported by the robot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    #[default]
    Available,
    Busy,
    Stopped,
    Offline,
}

/// Transient robot snapshot. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub pose: Option<Pose>,
    /// Battery charge in percent.
    pub battery_level: Option<f32>,
    pub status: RobotStatus,
    /// Status of the mission as the robot sees it, when it tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_status: Option<MissionStatus>,
}

/// Per-task outcome reported while polling the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    InProgress,
    Successful,
    /// Finished, but only part of what was asked for was captured.
    PartiallySuccessful(String),
    Failed(TaskFailure),
}

/// Result of one `poll_status` call.
#[derive(Clone, Debug, PartialEq)]
pub struct DriverStatus {
    /// Task the status refers to, when the driver tracks it.
    pub task_id: Option<TaskId>,
    pub outcome: TaskOutcome,
    /// Robot pose at the time of the report (pose at capture for artifacts).
    pub pose: Option<Pose>,
    pub artifacts: Vec<CapturedArtifact>,
}

impl DriverStatus {
    #[must_use]
    pub fn in_progress(task_id: Option<TaskId>) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::InProgress,
            pose: None,
            artifacts: Vec::new(),
        }
    }
}
