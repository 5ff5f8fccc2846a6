//! Result collector: persists inspection results off the state machine's path.
//!
//! [`ResultSender::submit`] only enqueues. The [`ResultCollector`] worker fans
//! each result out to every storage handler. Each (result, handler) pair is
//! retried on its own schedule with exponential backoff. Results of the same
//! mission reach a given handler in submission order: a lane is blocked while
//! its head is waiting for a retry. Every `store` call is bounded by
//! `store_timeout_ms`, so a handler that hangs only delays the others.

use crate::config::CollectorConfig;
use crate::events::{Event, EventBus};
use crate::model::{InspectionResult, MissionId};
use crate::error::StorageError;
use crate::storage::{StorageHandler, StoredLocation};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Create a connected sender and collector worker.
///
/// The worker exits once every sender is dropped and all queued work has
/// either been stored or given up on.
#[must_use]
pub fn channel(
    config: CollectorConfig,
    handlers: Vec<Arc<dyn StorageHandler>>,
    events: EventBus,
) -> (ResultSender, ResultCollector) {
    let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));
    let sender = ResultSender {
        tx,
        events: events.clone(),
    };
    let collector = ResultCollector {
        config,
        handlers,
        events,
        inbox: rx,
    };
    (sender, collector)
}

/// Non-blocking handoff into the collector inbox.
#[derive(Clone, Debug)]
pub struct ResultSender {
    tx: mpsc::Sender<InspectionResult>,
    events: EventBus,
}

impl ResultSender {
    /// Enqueue `result` and return immediately.
    ///
    /// Never fails the caller. If the inbox is full or the collector is gone
    /// the result is reported as failed on the event bus and logged.
    pub fn submit(&self, result: InspectionResult) {
        let mission_id = result.mission_id;
        let inspection_id = result.id;
        match self.tx.try_send(result) {
            Ok(()) => {
                debug!(mission_id = %mission_id, inspection = %inspection_id, "inspection queued");
                self.events.publish(Event::InspectionQueued {
                    mission_id,
                    inspection_id,
                });
            }
            Err(err) => {
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "collector inbox full",
                    mpsc::error::TrySendError::Closed(_) => "collector stopped",
                };
                error!(
                    mission_id = %mission_id,
                    inspection = %inspection_id,
                    reason,
                    "inspection dropped"
                );
                self.events.publish(Event::InspectionFailed {
                    mission_id,
                    inspection_id,
                    handler: "collector".to_string(),
                    error: reason.to_string(),
                });
            }
        }
    }
}

/// Totals reported when the collector exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectorReport {
    /// Successful (result, handler) deliveries.
    pub stored: usize,
    /// (result, handler) pairs given up on after the retry limit.
    pub failed: usize,
    pub retries: usize,
}

struct Job {
    result: Arc<InspectionResult>,
    retries: u32,
    ready_at: Instant,
}

/// Queue of pending work for one (mission, handler) pair.
struct Lane {
    mission_id: MissionId,
    handler: usize,
    jobs: VecDeque<Job>,
}

pub struct ResultCollector {
    config: CollectorConfig,
    handlers: Vec<Arc<dyn StorageHandler>>,
    events: EventBus,
    inbox: mpsc::Receiver<InspectionResult>,
}

impl ResultCollector {
    pub async fn run(mut self) -> CollectorReport {
        let mut lanes: Vec<Lane> = Vec::new();
        let mut report = CollectorReport::default();
        let mut open = true;
        info!(handlers = self.handlers.len(), "result collector started");

        loop {
            while let Ok(result) = self.inbox.try_recv() {
                self.enqueue(&mut lanes, result);
            }

            let now = Instant::now();
            if let Some(lane) = next_ready_lane(&lanes, now) {
                self.process_head(&mut lanes, lane, &mut report).await;
                lanes.retain(|lane| !lane.jobs.is_empty());
                continue;
            }

            if !open && lanes.is_empty() {
                break;
            }

            let wake_at = earliest_head(&lanes);
            tokio::select! {
                received = self.inbox.recv(), if open => match received {
                    Some(result) => self.enqueue(&mut lanes, result),
                    None => {
                        debug!(pending = lanes.len(), "collector inbox closed, draining");
                        open = false;
                    }
                },
                () = sleep_until_or_forever(wake_at) => {}
            }
        }

        info!(
            stored = report.stored,
            failed = report.failed,
            retries = report.retries,
            "result collector stopped"
        );
        report
    }

    fn enqueue(&self, lanes: &mut Vec<Lane>, result: InspectionResult) {
        let result = Arc::new(result);
        let now = Instant::now();
        for handler in 0..self.handlers.len() {
            let job = Job {
                result: Arc::clone(&result),
                retries: 0,
                ready_at: now,
            };
            let existing = lanes
                .iter_mut()
                .find(|lane| lane.mission_id == result.mission_id && lane.handler == handler);
            match existing {
                Some(lane) => lane.jobs.push_back(job),
                None => lanes.push(Lane {
                    mission_id: result.mission_id,
                    handler,
                    jobs: VecDeque::from([job]),
                }),
            }
        }
    }

    async fn process_head(&self, lanes: &mut [Lane], lane: usize, report: &mut CollectorReport) {
        let Some(lane) = lanes.get_mut(lane) else {
            return;
        };
        let Some(handler) = self.handlers.get(lane.handler) else {
            lane.jobs.clear();
            return;
        };
        let Some(job) = lane.jobs.front_mut() else {
            return;
        };
        let result = &job.result;
        let name = handler.name().to_string();

        match self.store(handler.as_ref(), result).await {
            Ok(location) => {
                info!(
                    mission_id = %result.mission_id,
                    inspection = %result.id,
                    handler = %name,
                    location = %location,
                    "inspection stored"
                );
                self.events.publish(Event::InspectionStored {
                    mission_id: result.mission_id,
                    inspection_id: result.id,
                    handler: name,
                    location: location.0,
                });
                report.stored += 1;
                lane.jobs.pop_front();
            }
            Err(err) if job.retries >= self.config.max_retry_attempts => {
                error!(
                    mission_id = %result.mission_id,
                    inspection = %result.id,
                    handler = %name,
                    attempts = job.retries + 1,
                    error = %err,
                    "giving up on inspection"
                );
                self.events.publish(Event::InspectionFailed {
                    mission_id: result.mission_id,
                    inspection_id: result.id,
                    handler: name,
                    error: err.to_string(),
                });
                report.failed += 1;
                lane.jobs.pop_front();
            }
            Err(err) => {
                let wait = self.config.backoff(job.retries);
                warn!(
                    mission_id = %result.mission_id,
                    inspection = %result.id,
                    handler = %name,
                    attempt = job.retries + 1,
                    retry_in_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "inspection upload failed, will retry"
                );
                job.retries += 1;
                job.ready_at = Instant::now() + wait;
                report.retries += 1;
            }
        }
    }

    async fn store(
        &self,
        handler: &dyn StorageHandler,
        result: &InspectionResult,
    ) -> Result<StoredLocation, StorageError> {
        let timeout = self.config.store_timeout();
        tokio::time::timeout(timeout, handler.store(result))
            .await
            .unwrap_or_else(|_| {
                Err(StorageError::Timeout {
                    handler: handler.name().to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }
}

/// Index of the lane whose head is due, earliest first.
fn next_ready_lane(lanes: &[Lane], now: Instant) -> Option<usize> {
    lanes
        .iter()
        .enumerate()
        .filter_map(|(index, lane)| lane.jobs.front().map(|job| (index, job.ready_at)))
        .filter(|(_, ready_at)| *ready_at <= now)
        .min_by_key(|(_, ready_at)| *ready_at)
        .map(|(index, _)| index)
}

fn earliest_head(lanes: &[Lane]) -> Option<Instant> {
    lanes
        .iter()
        .filter_map(|lane| lane.jobs.front().map(|job| job.ready_at))
        .min()
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::model::{CapturedArtifact, Frame, MediaType, Mission, Pose, Position, Task};
    use crate::storage::StoredLocation;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        failures_left: Mutex<u32>,
        stored: Mutex<Vec<crate::model::InspectionId>>,
    }

    #[async_trait]
    impl StorageHandler for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn store(&self, result: &InspectionResult) -> Result<StoredLocation, StorageError> {
            let mut failures = self.failures_left.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(StorageError::Unavailable("flaky".into()));
            }
            self.stored.lock().push(result.id);
            Ok(StoredLocation("memory".into()))
        }
    }

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            inbox_capacity: 8,
            max_retry_attempts: 3,
            retry_base_ms: 1,
            max_retry_wait_ms: 5,
            store_timeout_ms: 1_000,
        }
    }

    fn result(mission: &Mission) -> InspectionResult {
        let task = mission.tasks.first().cloned().unwrap();
        let artifact = CapturedArtifact::new(MediaType::Image, b"img".to_vec());
        InspectionResult::from_capture(mission, &task, task.pose, vec![artifact])
    }

    fn mission() -> Mission {
        let pose = Pose::at(Position::new(0.0, 0.0, 0.0, Frame::Asset));
        Mission::new("m", vec![Task::take_image(pose, pose.position)])
    }

    #[tokio::test]
    async fn retries_then_stores_in_order() {
        let handler = Arc::new(Recording::default());
        *handler.failures_left.lock() = 2;
        let handlers: Vec<Arc<dyn StorageHandler>> = vec![handler.clone()];
        let (sender, collector) = channel(fast_config(), handlers, EventBus::new(16));
        let mission = mission();
        let first = result(&mission);
        let second = result(&mission);
        let expected = vec![first.id, second.id];
        sender.submit(first);
        sender.submit(second);
        drop(sender);

        let report = tokio::time::timeout(Duration::from_secs(5), collector.run())
            .await
            .unwrap();
        assert_eq!(report.stored, 2);
        assert_eq!(report.retries, 2);
        assert_eq!(*handler.stored.lock(), expected);
    }

    #[tokio::test]
    async fn gives_up_after_retry_limit() {
        let handler = Arc::new(Recording::default());
        *handler.failures_left.lock() = 100;
        let events = EventBus::new(32);
        let mut rx = events.subscribe();
        let handlers: Vec<Arc<dyn StorageHandler>> = vec![handler.clone()];
        let (sender, collector) = channel(fast_config(), handlers, events);
        sender.submit(result(&mission()));
        drop(sender);

        let report = collector.run().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.retries, 3);
        assert_eq!(*handler.failures_left.lock(), 96);

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::InspectionFailed { handler, .. } = event {
                assert_eq!(handler, "recording");
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn submit_after_collector_gone_does_not_panic() {
        let (sender, collector) = channel(fast_config(), Vec::new(), EventBus::new(4));
        drop(collector);
        sender.submit(result(&mission()));
    }
}
