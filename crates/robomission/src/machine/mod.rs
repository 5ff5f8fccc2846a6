//! Mission state machine.
//!
//! A single worker task owns the active [`Mission`] and is the only writer of
//! its state. Callers talk to it through a cloneable [`StateMachineHandle`]:
//! commands travel over an mpsc channel, and every change is published as an
//! immutable [`MachineSnapshot`] through a watch channel, so readers never see
//! a half-updated mission.

mod states;

pub use states::State;

use crate::collector::ResultSender;
use crate::config::MachineConfig;
use crate::driver::{bounded, RobotDriver};
use crate::error::{codes, DriverError, RejectionError, TaskFailure};
use crate::events::{Event, EventBus};
use crate::model::{
    DriverStatus, ErrorInfo, InspectionResult, Mission, MissionId, MissionStatus, Task,
    TaskOutcome, TaskStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const COMMAND_CAPACITY: usize = 16;

/// Consistent view of the machine at one instant.
#[derive(Clone, Debug, Serialize)]
pub struct MachineSnapshot {
    pub state: State,
    /// Mission currently held by the machine, `None` while idle.
    pub mission: Option<Mission>,
    /// Most recent mission that reached a terminal status.
    pub last_mission: Option<Mission>,
    pub updated_at: DateTime<Utc>,
}

impl MachineSnapshot {
    fn idle() -> Self {
        Self {
            state: State::Idle,
            mission: None,
            last_mission: None,
            updated_at: Utc::now(),
        }
    }
}

type Reply = oneshot::Sender<Result<MissionId, RejectionError>>;

enum Command {
    Schedule { mission: Box<Mission>, reply: Reply },
    Stop { reply: Reply },
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schedule { mission, .. } => write!(f, "Schedule({})", mission.id),
            Self::Stop { .. } => f.write_str("Stop"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Why the machine entered `StoppingMission`.
#[derive(Debug)]
enum StopReason {
    Cancelled,
    Failed(ErrorInfo),
}

/// Cloneable front end of the state machine worker.
///
/// When every handle is dropped the worker stops any active mission and exits.
#[derive(Clone, Debug)]
pub struct StateMachineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<MachineSnapshot>>,
}

impl StateMachineHandle {
    /// Hand `mission` to the machine.
    ///
    /// Returns once the machine has accepted it (state `Initiate`) or refused it.
    /// Execution failures never surface here; they end up on the mission.
    pub async fn schedule(&self, mission: Mission) -> Result<MissionId, RejectionError> {
        mission.validate()?;
        self.request(|reply| Command::Schedule {
            mission: Box::new(mission),
            reply,
        })
        .await
    }

    /// Ask the machine to stop the active mission.
    pub async fn stop(&self) -> Result<MissionId, RejectionError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Stop any active mission and end the worker.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> Command,
    ) -> Result<MissionId, RejectionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| RejectionError::MachineUnavailable)?;
        response
            .await
            .map_err(|_| RejectionError::MachineUnavailable)?
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<MachineSnapshot> {
        self.snapshots.borrow().clone()
    }

    #[must_use]
    pub fn current_state(&self) -> State {
        self.snapshots.borrow().state
    }

    #[must_use]
    pub fn current_mission(&self) -> Option<Mission> {
        self.snapshots.borrow().mission.clone()
    }

    #[must_use]
    pub fn last_finished_mission(&self) -> Option<Mission> {
        self.snapshots.borrow().last_mission.clone()
    }

    /// Receiver that wakes on every published snapshot.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<Arc<MachineSnapshot>> {
        self.snapshots.clone()
    }

    /// Wait until the machine is idle. Returns `false` on timeout.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.snapshots.clone();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|s| s.state == State::Idle)).await;
        match waited {
            Ok(Ok(_)) => true,
            // Worker gone: whatever it published last is final.
            Ok(Err(_)) => self.current_state() == State::Idle,
            Err(_) => false,
        }
    }

    /// Wait for mission `id` to reach a terminal status and return it.
    pub async fn wait_for_mission(&self, id: MissionId, timeout: Duration) -> Option<Mission> {
        let finished = |s: &Arc<MachineSnapshot>| {
            s.last_mission.as_ref().filter(|m| m.id == id).cloned()
        };
        let mut rx = self.snapshots.clone();
        let _ = tokio::time::timeout(timeout, rx.wait_for(|s| finished(s).is_some())).await;
        finished(&self.snapshot())
    }
}

pub struct StateMachine {
    config: MachineConfig,
    driver: Arc<dyn RobotDriver>,
    results: ResultSender,
    events: EventBus,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Arc<MachineSnapshot>>,
    state: State,
    mission: Option<Mission>,
    last_mission: Option<Mission>,
    task_index: usize,
    /// Deadline of the current task, shared by all of its attempts.
    task_deadline: Instant,
    stop_reason: Option<StopReason>,
    /// A stop arrived while a driver call was in flight.
    stop_requested: bool,
    shutting_down: bool,
}

impl StateMachine {
    /// Start the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        config: MachineConfig,
        driver: Arc<dyn RobotDriver>,
        results: ResultSender,
        events: EventBus,
    ) -> (StateMachineHandle, JoinHandle<()>) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (snapshots, snapshot_rx) = watch::channel(Arc::new(MachineSnapshot::idle()));
        let machine = Self {
            config,
            driver,
            results,
            events,
            commands,
            snapshots,
            state: State::Idle,
            mission: None,
            last_mission: None,
            task_index: 0,
            task_deadline: Instant::now(),
            stop_reason: None,
            stop_requested: false,
            shutting_down: false,
        };
        let worker = tokio::spawn(machine.run());
        let handle = StateMachineHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (handle, worker)
    }

    async fn run(mut self) {
        info!("state machine started");
        loop {
            if self.honor_stop_request() {
                continue;
            }
            match self.state {
                State::Idle => {
                    if self.shutting_down || !self.idle().await {
                        break;
                    }
                }
                State::Initiate => self.initiate().await,
                State::Running => self.run_task().await,
                State::AwaitingNextTask => self.advance(),
                State::StoppingMission => self.stop_mission().await,
            }
        }
        info!("state machine stopped");
    }

    /// Wait for the next command. Returns `false` when the worker should exit.
    async fn idle(&mut self) -> bool {
        match self.commands.recv().await {
            Some(Command::Schedule { mission, reply }) => {
                let mission = *mission;
                if let Err(err) = mission.validate() {
                    warn!(mission_id = %mission.id, error = %err, "mission rejected");
                    let _ = reply.send(Err(err));
                    return true;
                }
                let id = mission.id;
                info!(
                    mission_id = %id,
                    name = %mission.name,
                    tasks = mission.tasks.len(),
                    "mission accepted"
                );
                self.mission = Some(mission);
                self.task_index = 0;
                self.stop_reason = None;
                self.transition(State::Initiate);
                let _ = reply.send(Ok(id));
                true
            }
            Some(Command::Stop { reply }) => {
                let _ = reply.send(Err(RejectionError::NoActiveMission));
                true
            }
            Some(Command::Shutdown) | None => false,
        }
    }

    async fn initiate(&mut self) {
        let timeout = self.config.driver_call_timeout();
        let driver = Arc::clone(&self.driver);
        let reachable = bounded("robot_state", timeout, driver.robot_state());
        match self.while_busy(reachable).await {
            Ok(robot) => {
                debug!(
                    status = ?robot.status,
                    battery = ?robot.battery_level,
                    mission_status = ?robot.mission_status,
                    "robot ready"
                );
                let Some(mission) = self.mission.as_mut() else {
                    self.transition(State::Idle);
                    return;
                };
                mission.status = MissionStatus::InProgress;
                mission.started_at = Some(Utc::now());
                let event = Event::MissionStarted {
                    mission_id: mission.id,
                    name: mission.name.clone(),
                    total_tasks: mission.tasks.len(),
                };
                self.events.publish(event);
                self.transition(State::Running);
            }
            Err(err) => {
                error!(error = %err, "robot not reachable, mission not started");
                let info = ErrorInfo::new(codes::INITIATE_FAILED, err.to_string());
                if let Some(mission) = self.mission.as_mut() {
                    mission.status = MissionStatus::Failed;
                    mission.error = Some(info);
                }
                self.finish_mission();
            }
        }
    }

    /// Execute the current task once and poll it until it resolves.
    async fn run_task(&mut self) {
        let Some(task) = self.begin_attempt() else {
            return;
        };
        if self.dispatch(&task).await && !self.honor_stop_request() {
            self.supervise(&task).await;
        }
    }

    /// Mark the current task in progress and announce the attempt.
    fn begin_attempt(&mut self) -> Option<Task> {
        let index = self.task_index;
        let Some(mission) = self.mission.as_mut() else {
            self.transition(State::Idle);
            return None;
        };
        let mission_id = mission.id;
        let Some(task) = mission.tasks.get_mut(index) else {
            self.transition(State::AwaitingNextTask);
            return None;
        };
        task.status = TaskStatus::InProgress;
        task.attempts += 1;
        let task = task.clone();
        if task.attempts == 1 {
            self.task_deadline = Instant::now() + self.config.task_timeout();
        }
        self.publish();

        info!(
            mission_id = %mission_id,
            task_id = %task.id,
            kind = task.kind.name(),
            attempt = task.attempts,
            "executing task"
        );
        self.events.publish(Event::TaskStarted {
            mission_id,
            task_id: task.id,
            index: index + 1,
            kind: task.kind.name().to_string(),
        });
        Some(task)
    }

    /// Send the task to the robot. Returns `false` if it never started.
    async fn dispatch(&mut self, task: &Task) -> bool {
        let driver = Arc::clone(&self.driver);
        let timeout = self.config.driver_call_timeout();
        let started = bounded("execute", timeout, driver.execute(task));
        let Err(err) = self.while_busy(started).await else {
            return true;
        };
        if err.is_fatal() {
            self.driver_error(&err, "execute");
        } else {
            warn!(task_id = %task.id, error = %err, "task could not be started");
            let failure = TaskFailure::recoverable(format!("task could not be started: {err}"));
            self.task_failed(&failure);
        }
        false
    }

    /// Poll the robot until the task resolves, times out or a stop arrives.
    /// The deadline is the task's, so retries do not extend it.
    async fn supervise(&mut self, task: &Task) {
        let deadline = self.task_deadline;
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv(), if !self.shutting_down => {
                    self.command_while_busy(command);
                    if self.honor_stop_request() {
                        return;
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    self.task_timed_out(task);
                    return;
                }
                _ = ticker.tick() => {
                    if self.poll_once(task).await || self.honor_stop_request() {
                        return;
                    }
                }
            }
        }
    }

    /// One status poll. Returns `true` once the machine has left `Running`.
    async fn poll_once(&mut self, task: &Task) -> bool {
        let driver = Arc::clone(&self.driver);
        let timeout = self.config.driver_call_timeout();
        let poll = bounded("poll_status", timeout, driver.poll_status());
        match self.while_busy(poll).await {
            Ok(status) => self.handle_status(task, status),
            Err(err) => {
                self.driver_error(&err, "poll_status");
                self.state != State::Running
            }
        }
    }

    fn task_timed_out(&mut self, task: &Task) {
        let timeout_ms = u64::try_from(self.config.task_timeout().as_millis()).unwrap_or(u64::MAX);
        warn!(task_id = %task.id, timeout_ms, "task timed out");
        let info = ErrorInfo::new(
            codes::TASK_TIMEOUT,
            format!("task {} did not finish within {timeout_ms}ms", task.id),
        );
        self.fail_mission(info);
    }

    /// Await a driver call while still answering commands.
    ///
    /// Schedules are refused at once. A stop is only recorded here and turned
    /// into a transition by [`Self::honor_stop_request`] once the call returns.
    async fn while_busy<T>(&mut self, call: impl Future<Output = T>) -> T {
        tokio::pin!(call);
        loop {
            tokio::select! {
                biased;
                output = &mut call => return output,
                command = self.commands.recv(), if !self.shutting_down => {
                    self.command_while_busy(command);
                }
            }
        }
    }

    /// React to a command received while a mission is active.
    fn command_while_busy(&mut self, command: Option<Command>) {
        let active = self.mission.as_ref().map(|m| m.id);
        match command {
            Some(Command::Schedule { mission, reply }) => {
                let running = active.unwrap_or(mission.id);
                debug!(
                    rejected = %mission.id,
                    running = %running,
                    state = %self.state,
                    "mission already running"
                );
                let _ = reply.send(Err(RejectionError::AlreadyRunning {
                    mission_id: running,
                }));
            }
            Some(Command::Stop { reply }) => {
                info!(mission_id = ?active, state = %self.state, "stop requested");
                self.stop_requested = true;
                let _ = reply.send(active.ok_or(RejectionError::NoActiveMission));
            }
            Some(Command::Shutdown) | None => {
                info!(mission_id = ?active, "shutting down with an active mission");
                self.shutting_down = true;
                self.stop_requested = true;
            }
        }
    }

    /// Start stopping the mission if a stop is pending. Returns `true` if it did.
    fn honor_stop_request(&mut self) -> bool {
        let stoppable = matches!(
            self.state,
            State::Initiate | State::Running | State::AwaitingNextTask
        );
        if !self.stop_requested || !stoppable {
            return false;
        }
        self.begin_stop(StopReason::Cancelled);
        true
    }

    /// Apply one driver status. Returns `true` once the task is resolved.
    fn handle_status(&mut self, task: &Task, status: DriverStatus) -> bool {
        if status.task_id.is_some_and(|id| id != task.id) {
            debug!(expected = %task.id, reported = ?status.task_id, "ignoring stale status");
            return false;
        }
        match status.outcome {
            TaskOutcome::InProgress => {
                debug!(task_id = %task.id, "task in progress");
                false
            }
            TaskOutcome::Successful => {
                self.task_succeeded(task, status, TaskStatus::Successful);
                true
            }
            TaskOutcome::PartiallySuccessful(ref reason) => {
                warn!(task_id = %task.id, reason = %reason, "task partially successful");
                self.task_succeeded(task, status, TaskStatus::PartiallySuccessful);
                true
            }
            TaskOutcome::Failed(failure) => {
                self.task_failed(&failure);
                true
            }
        }
    }

    fn task_succeeded(&mut self, task: &Task, status: DriverStatus, outcome: TaskStatus) {
        let index = self.task_index;
        let Some(mission) = self.mission.as_mut() else {
            return;
        };
        if let Some(current) = mission.tasks.get_mut(index) {
            current.status = outcome;
            current.error = None;
        }
        info!(mission_id = %mission.id, task_id = %task.id, status = %outcome, "task finished");
        self.events.publish(Event::TaskFinished {
            mission_id: mission.id,
            task_id: task.id,
            status: outcome,
        });

        if !status.artifacts.is_empty() {
            let pose = status.pose.unwrap_or_else(|| {
                warn!(task_id = %task.id, "driver reported no pose, using the task pose");
                task.pose
            });
            let result = InspectionResult::from_capture(mission, task, pose, status.artifacts);
            self.results.submit(result);
        }
        self.transition(State::AwaitingNextTask);
    }

    fn task_failed(&mut self, failure: &TaskFailure) {
        let index = self.task_index;
        let max_retries = self.config.max_task_retries;
        let Some(mission) = self.mission.as_mut() else {
            return;
        };
        let mission_id = mission.id;
        let Some(task) = mission.tasks.get_mut(index) else {
            return;
        };
        let info = ErrorInfo::new(codes::TASK_FAILED, failure.reason());

        if failure.is_fatal() {
            error!(task_id = %task.id, reason = failure.reason(), "fatal task failure");
            self.fail_mission(info);
            return;
        }

        if task.attempts <= max_retries {
            warn!(
                task_id = %task.id,
                attempt = task.attempts,
                max_retries,
                reason = failure.reason(),
                "task failed, retrying"
            );
            task.error = Some(info);
            let event = Event::TaskRetrying {
                mission_id,
                task_id: task.id,
                attempt: task.attempts,
                reason: failure.reason().to_string(),
            };
            self.events.publish(event);
            self.publish();
            return;
        }

        warn!(task_id = %task.id, attempts = task.attempts, "task failed, retry limit reached");
        task.status = TaskStatus::Failed;
        task.error = Some(info);
        let event = Event::TaskFinished {
            mission_id,
            task_id: task.id,
            status: TaskStatus::Failed,
        };
        self.events.publish(event);
        self.transition(State::AwaitingNextTask);
    }

    /// Fatal driver errors force a stop. Anything else is logged and the
    /// caller decides whether to keep polling.
    fn driver_error(&mut self, err: &DriverError, operation: &str) {
        if err.is_fatal() {
            error!(operation, error = %err, "robot driver unavailable");
            let info = ErrorInfo::new(codes::DRIVER_UNAVAILABLE, err.to_string());
            self.fail_mission(info);
        } else {
            warn!(operation, error = %err, "robot driver call failed");
        }
    }

    /// Mark the current task failed with `info` and stop the mission as Failed.
    fn fail_mission(&mut self, info: ErrorInfo) {
        let index = self.task_index;
        if let Some(task) = self.mission.as_mut().and_then(|m| m.tasks.get_mut(index)) {
            if task.status == TaskStatus::InProgress {
                task.status = TaskStatus::Failed;
                task.error = Some(info.clone());
            }
        }
        self.begin_stop(StopReason::Failed(info));
    }

    fn begin_stop(&mut self, reason: StopReason) {
        self.stop_requested = false;
        self.stop_reason = Some(reason);
        self.transition(State::StoppingMission);
    }

    fn advance(&mut self) {
        let next = self.task_index + 1;
        let remaining = self.mission.as_ref().is_some_and(|m| next < m.tasks.len());
        if remaining {
            self.task_index = next;
            self.transition(State::Running);
            return;
        }
        if let Some(mission) = self.mission.as_mut() {
            mission.status = mission.completion_status();
        }
        self.finish_mission();
    }

    async fn stop_mission(&mut self) {
        let attempts = self.config.stop_attempts.max(1);
        let timeout = self.config.stop_timeout();
        let driver = Arc::clone(&self.driver);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.while_busy(bounded("stop", timeout, driver.stop())).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "robot did not confirm stop");
                    last_error = Some(err);
                }
            }
        }

        let reason = self.stop_reason.take().unwrap_or(StopReason::Cancelled);
        let index = self.task_index;
        if let Some(mission) = self.mission.as_mut() {
            let (status, info) = match reason {
                StopReason::Cancelled => (
                    MissionStatus::Cancelled,
                    ErrorInfo::new(codes::MISSION_CANCELLED, "mission stopped on request"),
                ),
                StopReason::Failed(info) => (MissionStatus::Failed, info),
            };
            if let Some(task) = mission.tasks.get_mut(index) {
                if task.status == TaskStatus::InProgress {
                    task.status = TaskStatus::Failed;
                    task.error = Some(info.clone());
                }
            }
            mission.status = status;
            mission.error = Some(info);
            if let Some(err) = last_error {
                error!(mission_id = %mission.id, error = %err, "robot never confirmed stop");
                let previous = mission.error.take();
                let mut info = ErrorInfo::new(
                    codes::STOP_FAILED,
                    format!("robot did not confirm stop after {attempts} attempts: {err}"),
                );
                if let Some(previous) = previous.and_then(|p| serde_json::to_value(p).ok()) {
                    info = info.with_context(serde_json::json!({ "cause": previous }));
                }
                mission.status = MissionStatus::Failed;
                mission.error = Some(info);
            }
        }
        self.finish_mission();
    }

    /// Move the mission to `last_mission`, announce it and go idle.
    fn finish_mission(&mut self) {
        if let Some(mut mission) = self.mission.take() {
            mission.ended_at = Some(Utc::now());
            info!(
                mission_id = %mission.id,
                status = %mission.status,
                finished_tasks = mission.finished_tasks(),
                total_tasks = mission.tasks.len(),
                "mission finished"
            );
            self.events.publish(Event::MissionFinished {
                mission: Box::new(mission.clone()),
            });
            self.last_mission = Some(mission);
        }
        self.task_index = 0;
        self.stop_requested = false;
        self.transition(State::Idle);
    }

    fn transition(&mut self, to: State) {
        let from = self.state;
        if !from.can_transition_to(to) {
            warn!(%from, %to, "unexpected state transition");
        }
        self.state = to;
        let mission_id = self
            .mission
            .as_ref()
            .or(self.last_mission.as_ref())
            .map(|m| m.id);
        info!(%from, %to, mission_id = ?mission_id, "state changed");
        self.publish();
        self.events.publish(Event::StateChanged {
            from,
            to,
            mission_id,
        });
    }

    fn publish(&self) {
        let snapshot = MachineSnapshot {
            state: self.state,
            mission: self.mission.clone(),
            last_mission: self.last_mission.clone(),
            updated_at: Utc::now(),
        };
        self.snapshots.send_replace(Arc::new(snapshot));
    }
}
