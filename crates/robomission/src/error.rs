//! Error taxonomy for scheduling, execution, persistence and loading.
//!
//! Only [`RejectionError`] ever crosses the scheduling boundary. Task and driver
//! failures end up as [`ErrorInfo`](crate::model::ErrorInfo) on the mission.

use crate::model::MissionId;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes recorded in [`ErrorInfo`](crate::model::ErrorInfo).
pub mod codes {
    pub const TASK_FAILED: &str = "E_TASK_FAILED";
    pub const TASK_TIMEOUT: &str = "E_TASK_TIMEOUT";
    pub const DRIVER_UNAVAILABLE: &str = "E_DRIVER_UNAVAILABLE";
    pub const MISSION_CANCELLED: &str = "E_MISSION_CANCELLED";
    pub const STOP_FAILED: &str = "E_STOP_FAILED";
    pub const INITIATE_FAILED: &str = "E_INITIATE_FAILED";
    pub const ALREADY_RUNNING: &str = "E_ALREADY_RUNNING";
    pub const MISSION_NOT_FOUND: &str = "E_MISSION_NOT_FOUND";
    pub const EMPTY_MISSION: &str = "E_EMPTY_MISSION";
    pub const UNKNOWN_TASK_KIND: &str = "E_UNKNOWN_TASK_KIND";
    pub const INVALID_DEFINITION: &str = "E_INVALID_DEFINITION";
    pub const NO_ACTIVE_MISSION: &str = "E_NO_ACTIVE_MISSION";
    pub const MACHINE_UNAVAILABLE: &str = "E_MACHINE_UNAVAILABLE";
}

/// A schedule or stop request refused by the machine.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum RejectionError {
    #[error("mission {mission_id} is already running")]
    #[diagnostic(
        code(robomission::rejection::already_running),
        help("wait for the state machine to return to idle, or stop the active mission")
    )]
    AlreadyRunning { mission_id: MissionId },

    #[error("mission definition '{id}' was not found")]
    #[diagnostic(code(robomission::rejection::mission_not_found))]
    MissionNotFound { id: String },

    #[error("mission '{id}' has no tasks")]
    #[diagnostic(code(robomission::rejection::empty_mission))]
    EmptyMission { id: String },

    #[error("unknown task kind '{kind}'")]
    #[diagnostic(
        code(robomission::rejection::unknown_task_kind),
        help("supported kinds: return_to_home, localize, take_image, take_thermal_image, take_video, record_audio")
    )]
    UnknownTaskKind { kind: String },

    #[error("invalid mission definition: {reason}")]
    #[diagnostic(code(robomission::rejection::invalid_definition))]
    InvalidDefinition { reason: String },

    #[error("no mission is active")]
    #[diagnostic(code(robomission::rejection::no_active_mission))]
    NoActiveMission,

    #[error("state machine is not running")]
    #[diagnostic(code(robomission::rejection::machine_unavailable))]
    MachineUnavailable,
}

impl RejectionError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => codes::ALREADY_RUNNING,
            Self::MissionNotFound { .. } => codes::MISSION_NOT_FOUND,
            Self::EmptyMission { .. } => codes::EMPTY_MISSION,
            Self::UnknownTaskKind { .. } => codes::UNKNOWN_TASK_KIND,
            Self::InvalidDefinition { .. } => codes::INVALID_DEFINITION,
            Self::NoActiveMission => codes::NO_ACTIVE_MISSION,
            Self::MachineUnavailable => codes::MACHINE_UNAVAILABLE,
        }
    }
}

/// Failure of a task as reported by the robot.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "severity", rename_all = "snake_case")]
pub enum TaskFailure {
    /// Retried in place up to the configured limit.
    #[error("recoverable task failure: {reason}")]
    #[diagnostic(code(robomission::task::recoverable))]
    Recoverable { reason: String },

    /// Aborts the remaining tasks and forces a stop.
    #[error("fatal task failure: {reason}")]
    #[diagnostic(code(robomission::task::fatal))]
    Fatal { reason: String },
}

impl TaskFailure {
    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self::Recoverable {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Recoverable { reason } | Self::Fatal { reason } => reason,
        }
    }
}

/// Error raised by a [`RobotDriver`](crate::driver::RobotDriver) call.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum DriverError {
    /// Robot cannot be reached at all. Always fatal for the mission.
    #[error("robot driver unavailable: {0}")]
    #[diagnostic(code(robomission::driver::unavailable))]
    Unavailable(String),

    /// Transient transport hiccup; the caller may poll again.
    #[error("robot communication error: {0}")]
    #[diagnostic(code(robomission::driver::communication))]
    Communication(String),

    /// Robot refused the command.
    #[error("robot rejected the command: {0}")]
    #[diagnostic(code(robomission::driver::rejected))]
    Rejected(String),

    #[error("robot driver call '{operation}' timed out after {timeout_ms}ms")]
    #[diagnostic(code(robomission::driver::timeout))]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl DriverError {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Failure of a storage handler to persist an inspection.
#[derive(Debug, Error, Diagnostic)]
pub enum StorageError {
    #[error("failed to write {path}")]
    #[diagnostic(code(robomission::storage::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize inspection metadata")]
    #[diagnostic(code(robomission::storage::serialize))]
    Serialize(#[from] serde_json::Error),

    #[error("storage backend unavailable: {0}")]
    #[diagnostic(code(robomission::storage::unavailable))]
    Unavailable(String),

    #[error("storage handler {handler} did not answer within {timeout_ms}ms")]
    #[diagnostic(code(robomission::storage::timeout))]
    Timeout { handler: String, timeout_ms: u64 },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure to obtain a mission from a mission source.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("mission definition '{id}' was not found")]
    #[diagnostic(code(robomission::load::not_found))]
    NotFound { id: String },

    #[error("failed to read {path}")]
    #[diagnostic(code(robomission::load::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    #[diagnostic(code(robomission::load::parse))]
    Parse { path: PathBuf, message: String },

    #[error("unknown task kind '{kind}'")]
    #[diagnostic(code(robomission::load::unknown_task_kind))]
    UnknownTaskKind { kind: String },

    #[error("invalid mission definition: {reason}")]
    #[diagnostic(code(robomission::load::invalid))]
    Invalid { reason: String },
}

impl From<LoadError> for RejectionError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound { id } => Self::MissionNotFound { id },
            LoadError::UnknownTaskKind { kind } => Self::UnknownTaskKind { kind },
            LoadError::Invalid { reason } => Self::InvalidDefinition { reason },
            other @ (LoadError::Io { .. } | LoadError::Parse { .. }) => Self::InvalidDefinition {
                reason: other.to_string(),
            },
        }
    }
}

/// Failure to load [`Settings`](crate::config::Settings).
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    #[diagnostic(code(robomission::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(code(robomission::config::parse))]
    Parse { path: PathBuf, message: String },
}
