//! In-process robot used by tests and the CLI.
//!
//! Each `execute` consumes the next scripted [`SimulatedOutcome`] (default
//! [`SimulatedOutcome::Succeed`]). A task stays in progress for
//! `task_duration`, then resolves. The robot "arrives" at the task pose shifted
//! by `pose_offset`, which is also the pose recorded for captured artifacts.

use crate::driver::RobotDriver;
use crate::error::{DriverError, TaskFailure};
use crate::model::{
    CapturedArtifact, DriverStatus, MediaType, MissionStatus, Pose, Position, RobotState,
    RobotStatus, Task, TaskId, TaskOutcome,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Scripted result of one `execute` call.
#[derive(Clone, Debug, PartialEq)]
pub enum SimulatedOutcome {
    /// Succeed, capturing the task kind's media if it is an inspection.
    Succeed,
    /// Succeed and capture exactly these media, whatever the task kind.
    SucceedWith { media: Vec<MediaType> },
    /// Finish with only `media` captured and report the task partially successful.
    SucceedPartially {
        media: Vec<MediaType>,
        reason: String,
    },
    FailRecoverable(String),
    FailFatal(String),
    /// Never finish.
    Hang,
    /// Lose the link: every poll reports the driver unavailable.
    Unavailable,
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Time a task stays in progress before resolving.
    pub task_duration: Duration,
    /// Difference between the commanded pose and the pose actually reached.
    pub pose_offset: (f64, f64, f64),
    pub battery_level: f32,
    /// Number of leading `stop` calls that fail.
    pub failing_stops: u32,
    /// Report the robot unreachable from `robot_state`.
    pub offline: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            task_duration: Duration::from_millis(200),
            pose_offset: (0.05, -0.02, 0.0),
            battery_level: 87.5,
            failing_stops: 0,
            offline: false,
        }
    }
}

struct ActiveTask {
    task: Task,
    started: Instant,
    outcome: SimulatedOutcome,
}

#[derive(Default)]
struct SimState {
    script: VecDeque<SimulatedOutcome>,
    active: Option<ActiveTask>,
    executed: Vec<TaskId>,
    stop_calls: u32,
    failing_stops: u32,
    pose: Option<Pose>,
    link_lost: bool,
}

pub struct SimulatedDriver {
    config: SimulationConfig,
    state: Mutex<SimState>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl SimulatedDriver {
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        let state = SimState {
            failing_stops: config.failing_stops,
            ..SimState::default()
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Queue outcomes for the next `execute` calls, in order.
    #[must_use]
    pub fn with_script(self, outcomes: impl IntoIterator<Item = SimulatedOutcome>) -> Self {
        self.state.lock().script.extend(outcomes);
        self
    }

    pub fn push_outcome(&self, outcome: SimulatedOutcome) {
        self.state.lock().script.push_back(outcome);
    }

    /// Task ids in the order `execute` received them, retries included.
    #[must_use]
    pub fn executed_tasks(&self) -> Vec<TaskId> {
        self.state.lock().executed.clone()
    }

    #[must_use]
    pub fn stop_calls(&self) -> u32 {
        self.state.lock().stop_calls
    }

    fn reached_pose(&self, task: &Task) -> Pose {
        let (dx, dy, dz) = self.config.pose_offset;
        Pose {
            position: task.pose.position.offset(dx, dy, dz),
            ..task.pose
        }
    }

    fn resolve(&self, active: &ActiveTask) -> (TaskOutcome, Vec<CapturedArtifact>) {
        match &active.outcome {
            SimulatedOutcome::Succeed => {
                let media: Vec<MediaType> = active.task.kind.media_type().into_iter().collect();
                (TaskOutcome::Successful, capture(&active.task, &media))
            }
            SimulatedOutcome::SucceedWith { media } => {
                (TaskOutcome::Successful, capture(&active.task, media))
            }
            SimulatedOutcome::SucceedPartially { media, reason } => (
                TaskOutcome::PartiallySuccessful(reason.clone()),
                capture(&active.task, media),
            ),
            SimulatedOutcome::FailRecoverable(reason) => (
                TaskOutcome::Failed(TaskFailure::recoverable(reason.clone())),
                Vec::new(),
            ),
            SimulatedOutcome::FailFatal(reason) => (
                TaskOutcome::Failed(TaskFailure::fatal(reason.clone())),
                Vec::new(),
            ),
            SimulatedOutcome::Hang | SimulatedOutcome::Unavailable => {
                (TaskOutcome::InProgress, Vec::new())
            }
        }
    }
}

fn capture(task: &Task, media: &[MediaType]) -> Vec<CapturedArtifact> {
    media
        .iter()
        .map(|media_type| {
            let payload = format!("simulated {media_type} for task {}", task.id);
            CapturedArtifact::new(*media_type, payload.into_bytes())
        })
        .collect()
}

#[async_trait]
impl RobotDriver for SimulatedDriver {
    async fn execute(&self, task: &Task) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if state.link_lost {
            return Err(DriverError::Unavailable("simulated link lost".to_string()));
        }
        let outcome = state.script.pop_front().unwrap_or(SimulatedOutcome::Succeed);
        state.executed.push(task.id);
        state.active = Some(ActiveTask {
            task: task.clone(),
            started: Instant::now(),
            outcome,
        });
        Ok(())
    }

    async fn poll_status(&self) -> Result<DriverStatus, DriverError> {
        let mut state = self.state.lock();
        let Some(active) = state.active.as_ref() else {
            return Err(DriverError::Communication(
                "no task is executing".to_string(),
            ));
        };
        if active.outcome == SimulatedOutcome::Unavailable {
            state.link_lost = true;
            return Err(DriverError::Unavailable("simulated link lost".to_string()));
        }
        let task_id = Some(active.task.id);
        if active.outcome == SimulatedOutcome::Hang
            || active.started.elapsed() < self.config.task_duration
        {
            let mut status = DriverStatus::in_progress(task_id);
            status.pose = state.pose;
            return Ok(status);
        }
        let pose = self.reached_pose(&active.task);
        let (outcome, artifacts) = self.resolve(active);
        state.active = None;
        state.pose = Some(pose);
        Ok(DriverStatus {
            task_id,
            outcome,
            pose: Some(pose),
            artifacts,
        })
    }

    async fn stop(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.stop_calls += 1;
        if state.failing_stops > 0 {
            state.failing_stops -= 1;
            return Err(DriverError::Communication(
                "simulated stop not confirmed".to_string(),
            ));
        }
        state.active = None;
        Ok(())
    }

    async fn robot_state(&self) -> Result<RobotState, DriverError> {
        if self.config.offline {
            return Err(DriverError::Unavailable("simulated robot offline".to_string()));
        }
        let state = self.state.lock();
        if state.link_lost {
            return Err(DriverError::Unavailable("simulated link lost".to_string()));
        }
        let busy = state.active.is_some();
        Ok(RobotState {
            pose: state.pose,
            battery_level: Some(self.config.battery_level),
            status: if busy {
                RobotStatus::Busy
            } else {
                RobotStatus::Available
            },
            mission_status: busy.then_some(MissionStatus::InProgress),
        })
    }
}

/// Home pose used by the bundled demo missions.
#[must_use]
pub fn home_pose() -> Pose {
    Pose::at(Position::new(0.0, 0.0, 0.0, crate::model::Frame::Asset))
}
