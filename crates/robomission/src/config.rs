//! Service settings: timing budgets for the state machine and retry policy for
//! the result collector.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`Settings::results_root`].
pub const ENV_RESULTS_ROOT: &str = "ROBOMISSION_RESULTS_ROOT";
/// Environment variable overriding [`Settings::predefined_missions_folder`].
pub const ENV_MISSIONS_FOLDER: &str = "ROBOMISSION_MISSIONS_FOLDER";

/// Top-level service settings. Every field has a default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root under which one directory per mission is created.
    pub results_root: PathBuf,
    /// Folder holding predefined mission definitions (`<id>.json|.yaml`).
    pub predefined_missions_folder: PathBuf,
    pub machine: MachineConfig,
    pub collector: CollectorConfig,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            results_root: PathBuf::from("results"),
            predefined_missions_folder: PathBuf::from("missions"),
            machine: MachineConfig::default(),
            collector: CollectorConfig::default(),
            event_capacity: 256,
        }
    }
}

impl Settings {
    /// Load settings from a JSON or YAML file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path.to_string_lossy();
        if name.ends_with(".yaml") || name.ends_with(".yml") {
            serde_yml::from_str(&data).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })
        } else {
            serde_json::from_str(&data).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })
        }
    }

    /// Apply `ROBOMISSION_*` path overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply path overrides from an arbitrary lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup(ENV_RESULTS_ROOT).filter(|v| !v.is_empty()) {
            self.results_root = PathBuf::from(root);
        }
        if let Some(folder) = lookup(ENV_MISSIONS_FOLDER).filter(|v| !v.is_empty()) {
            self.predefined_missions_folder = PathBuf::from(folder);
        }
        self
    }
}

/// Timing and retry budgets of the mission state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Interval between two driver status polls.
    pub poll_interval_ms: u64,
    /// Upper bound on one task, retries included. Exceeding it is fatal.
    pub task_timeout_ms: u64,
    /// Re-executions allowed after a recoverable failure.
    pub max_task_retries: u32,
    /// Bound on any single driver call.
    pub driver_call_timeout_ms: u64,
    /// Bound on one stop attempt.
    pub stop_timeout_ms: u64,
    pub stop_attempts: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            task_timeout_ms: 300_000,
            max_task_retries: 2,
            driver_call_timeout_ms: 5_000,
            stop_timeout_ms: 10_000,
            stop_attempts: 3,
        }
    }
}

impl MachineConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    #[must_use]
    pub fn driver_call_timeout(&self) -> Duration {
        Duration::from_millis(self.driver_call_timeout_ms)
    }

    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Queue and retry policy of the result collector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Capacity of the handoff queue between the state machine and the collector.
    pub inbox_capacity: usize,
    /// Retries after the first failed attempt, per storage handler.
    pub max_retry_attempts: u32,
    /// Base of the exponential backoff (`base * 2^retry`).
    pub retry_base_ms: u64,
    /// Cap on the backoff between two attempts.
    pub max_retry_wait_ms: u64,
    /// Upper bound on one `store` call. A call that exceeds it counts as a
    /// failed attempt and is retried like any other storage error.
    pub store_timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 128,
            max_retry_attempts: 5,
            retry_base_ms: 1_000,
            max_retry_wait_ms: 60_000,
            store_timeout_ms: 30_000,
        }
    }
}

impl CollectorConfig {
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms.max(1))
    }

    /// Wait before the attempt following retry number `retry` (0-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1_u64.checked_shl(retry).unwrap_or(u64::MAX);
        let wait = self.retry_base_ms.saturating_mul(factor);
        Duration::from_millis(wait.min(self.max_retry_wait_ms))
    }
}
