use crate::model::inspection::MediaType;
use crate::model::{ErrorInfo, Pose, Position, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire names of every task kind, in declaration order.
pub const TASK_KIND_NAMES: &[&str] = &[
    "return_to_home",
    "localize",
    "take_image",
    "take_thermal_image",
    "take_video",
    "record_audio",
];

/// Execution status of a single task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Successful,
    Failed,
    PartiallySuccessful,
}

impl TaskStatus {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Successful | Self::Failed | Self::PartiallySuccessful
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::PartiallySuccessful => "partially_successful",
        };
        write!(f, "{s}")
    }
}

/// What the robot is asked to do. Closed set: adding a kind means touching every match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Drive back to the docking/home pose.
    ReturnToHome,
    /// Re-localize the robot in the asset frame.
    Localize,
    /// Capture a visual image of `target`.
    TakeImage { target: Position },
    /// Capture a thermal image of `target`.
    TakeThermalImage { target: Position },
    /// Record video of `target`.
    TakeVideo { target: Position, duration_s: f64 },
    /// Record audio near `target`.
    RecordAudio { target: Position, duration_s: f64 },
}

impl TaskKind {
    /// Wire name, matching the serde tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReturnToHome => "return_to_home",
            Self::Localize => "localize",
            Self::TakeImage { .. } => "take_image",
            Self::TakeThermalImage { .. } => "take_thermal_image",
            Self::TakeVideo { .. } => "take_video",
            Self::RecordAudio { .. } => "record_audio",
        }
    }

    /// Media captured by inspection kinds.
    #[must_use]
    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            Self::ReturnToHome | Self::Localize => None,
            Self::TakeImage { .. } => Some(MediaType::Image),
            Self::TakeThermalImage { .. } => Some(MediaType::ThermalImage),
            Self::TakeVideo { .. } => Some(MediaType::Video),
            Self::RecordAudio { .. } => Some(MediaType::Audio),
        }
    }

    #[must_use]
    pub fn is_inspection(&self) -> bool {
        self.media_type().is_some()
    }

    #[must_use]
    pub fn inspection_target(&self) -> Option<&Position> {
        match self {
            Self::ReturnToHome | Self::Localize => None,
            Self::TakeImage { target }
            | Self::TakeThermalImage { target }
            | Self::TakeVideo { target, .. }
            | Self::RecordAudio { target, .. } => Some(target),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One unit of robot work inside a mission.
///
/// Everything except `status`, `attempts` and `error` is fixed once the mission
/// is built; the state machine is the only writer of those three.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Pose the robot drives to before acting.
    pub pose: Pose,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Execution attempts made so far (first try included).
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl Task {
    #[must_use]
    pub fn new(kind: TaskKind, pose: Pose) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            pose,
            tag: None,
            status: TaskStatus::NotStarted,
            attempts: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn return_to_home(pose: Pose) -> Self {
        Self::new(TaskKind::ReturnToHome, pose)
    }

    #[must_use]
    pub fn take_image(pose: Pose, target: Position) -> Self {
        Self::new(TaskKind::TakeImage { target }, pose)
    }

    #[must_use]
    pub fn take_thermal_image(pose: Pose, target: Position) -> Self {
        Self::new(TaskKind::TakeThermalImage { target }, pose)
    }
}
