use crate::error::RejectionError;
use crate::model::{MissionId, Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of a mission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    NotStarted,
    InProgress,
    Successful,
    PartiallySuccessful,
    Failed,
    Cancelled,
}

impl MissionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Successful | Self::PartiallySuccessful | Self::Failed | Self::Cancelled
        )
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Successful => "successful",
            Self::PartiallySuccessful => "partially_successful",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Structured error attached to a failed task or mission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// An ordered sequence of tasks submitted for execution.
///
/// While a mission is current, the state machine is its only writer; observers
/// receive cloned snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    /// Identifier of the predefined definition this mission was built from.
    #[serde(default)]
    pub definition_id: Option<String>,
    pub name: String,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub status: MissionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl Mission {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            id: MissionId::new(),
            definition_id: None,
            name: name.into(),
            tasks,
            status: MissionStatus::NotStarted,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    #[must_use]
    pub fn with_definition_id(mut self, id: impl Into<String>) -> Self {
        self.definition_id = Some(id.into());
        self
    }

    /// Reject missions that cannot be executed.
    pub fn validate(&self) -> Result<(), RejectionError> {
        if self.tasks.is_empty() {
            return Err(RejectionError::EmptyMission {
                id: self
                    .definition_id
                    .clone()
                    .unwrap_or_else(|| self.id.to_string()),
            });
        }
        if self.status != MissionStatus::NotStarted {
            return Err(RejectionError::InvalidDefinition {
                reason: format!("mission {} has already been executed", self.id),
            });
        }
        Ok(())
    }

    /// Status reached when every task has been attempted without a forced stop.
    #[must_use]
    pub fn completion_status(&self) -> MissionStatus {
        let total = self.tasks.len();
        let succeeded = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Successful)
            .count();
        if total > 0 && succeeded == total {
            MissionStatus::Successful
        } else if self
            .tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::Successful | TaskStatus::PartiallySuccessful))
        {
            MissionStatus::PartiallySuccessful
        } else {
            MissionStatus::Failed
        }
    }

    /// Count of tasks that reached a finished status.
    #[must_use]
    pub fn finished_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_finished()).count()
    }

    #[must_use]
    pub fn task(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }
}
