//! Robot driver capability set consumed by the state machine.
//!
//! Concrete transports live outside this crate; [`simulated::SimulatedDriver`]
//! is provided for tests and the CLI.

pub mod simulated;

pub use simulated::{SimulatedDriver, SimulatedOutcome, SimulationConfig};

use crate::error::DriverError;
use crate::model::{DriverStatus, RobotState, Task};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Capabilities the state machine needs from a robot.
///
/// # Contract
///
/// * `execute` – start `task` and return once the robot acknowledged it. Must
///   not wait for the task to finish.
/// * `poll_status` – report the outcome of the task started last, the current
///   pose, and any artifacts captured when the task succeeded.
/// * `stop` – halt the robot; `Ok` means the robot confirmed it stopped.
/// * `robot_state` – cheap snapshot used to check reachability.
#[async_trait]
pub trait RobotDriver: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<(), DriverError>;

    async fn poll_status(&self) -> Result<DriverStatus, DriverError>;

    async fn stop(&self) -> Result<(), DriverError>;

    async fn robot_state(&self) -> Result<RobotState, DriverError>;
}

#[async_trait]
impl<T: RobotDriver + ?Sized> RobotDriver for Arc<T> {
    async fn execute(&self, task: &Task) -> Result<(), DriverError> {
        (**self).execute(task).await
    }

    async fn poll_status(&self) -> Result<DriverStatus, DriverError> {
        (**self).poll_status().await
    }

    async fn stop(&self) -> Result<(), DriverError> {
        (**self).stop().await
    }

    async fn robot_state(&self) -> Result<RobotState, DriverError> {
        (**self).robot_state().await
    }
}

/// Run a driver call with an upper bound on its duration.
pub async fn bounded<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout {
            operation,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
