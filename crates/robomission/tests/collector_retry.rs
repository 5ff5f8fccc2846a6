// Test module - relaxed lint rules
#![allow(clippy::default_trait_access)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::inefficient_to_string)]
#![allow(clippy::panic)]
#![allow(clippy::manual_assert)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::cast_possible_truncation)]
#![allow(missing_docs)]

//! Result collector behaviour with unreliable storage handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use robomission::collector;
use robomission::storage::{LocalStorage, StorageHandler, StoredLocation};
use robomission::{
    CapturedArtifact, CollectorConfig, CollectorReport, Event, EventBus, Frame, InspectionId,
    InspectionResult, Mission, Pose, Position, StorageError, Task,
};

/// Fails the first `failures` calls for each inspection, then records it.
struct Flaky {
    name: String,
    failures: u32,
    attempts: Mutex<Vec<InspectionId>>,
    stored: Mutex<Vec<InspectionId>>,
}

impl Flaky {
    fn new(name: &str, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures,
            attempts: Mutex::new(Vec::new()),
            stored: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl StorageHandler for Flaky {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, result: &InspectionResult) -> Result<StoredLocation, StorageError> {
        let previous = {
            let mut attempts = self.attempts.lock();
            let previous = attempts.iter().filter(|id| **id == result.id).count();
            attempts.push(result.id);
            previous
        };
        if previous < self.failures as usize {
            return Err(StorageError::Unavailable(format!("{} is down", self.name)));
        }
        self.stored.lock().push(result.id);
        Ok(StoredLocation(format!("{}://{}", self.name, result.id)))
    }
}

/// Never answers.
struct Stuck;

#[async_trait]
impl StorageHandler for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn store(&self, _result: &InspectionResult) -> Result<StoredLocation, StorageError> {
        std::future::pending().await
    }
}

fn config() -> CollectorConfig {
    CollectorConfig {
        inbox_capacity: 32,
        max_retry_attempts: 4,
        retry_base_ms: 2,
        max_retry_wait_ms: 10,
        store_timeout_ms: 1_000,
    }
}

fn mission(name: &str) -> Mission {
    let pose = Pose::at(Position::new(3.0, 1.0, 0.0, Frame::Asset));
    let target = Position::new(3.0, 2.0, 1.0, Frame::Asset);
    Mission::new(
        name,
        vec![
            Task::take_image(pose, target),
            Task::take_thermal_image(pose, target),
        ],
    )
}

fn results(mission: &Mission) -> Vec<InspectionResult> {
    mission
        .tasks
        .iter()
        .map(|task| {
            let media = task.kind.media_type().unwrap();
            let artifact = CapturedArtifact::new(media, b"payload".to_vec());
            InspectionResult::from_capture(mission, task, task.pose, vec![artifact])
        })
        .collect()
}

#[tokio::test]
async fn retried_results_keep_submission_order_per_mission() {
    let flaky = Flaky::new("flaky", 2);
    let handlers: Vec<Arc<dyn StorageHandler>> = vec![flaky.clone()];
    let (sender, worker) = collector::channel(config(), handlers, EventBus::new(64));
    let worker = tokio::spawn(worker.run());

    let north = mission("north");
    let south = mission("south");
    let north_results = results(&north);
    let south_results = results(&south);
    let expected_north: Vec<InspectionId> = north_results.iter().map(|r| r.id).collect();
    let expected_south: Vec<InspectionId> = south_results.iter().map(|r| r.id).collect();
    for (a, b) in north_results.into_iter().zip(south_results) {
        sender.submit(a);
        sender.submit(b);
    }
    drop(sender);

    let report = tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.stored, 4);
    assert_eq!(report.retries, 8);

    let stored = flaky.stored.lock().clone();
    let north_order: Vec<InspectionId> = stored
        .iter()
        .copied()
        .filter(|id| expected_north.contains(id))
        .collect();
    let south_order: Vec<InspectionId> = stored
        .iter()
        .copied()
        .filter(|id| expected_south.contains(id))
        .collect();
    assert_eq!(north_order, expected_north);
    assert_eq!(south_order, expected_south);
}

#[tokio::test]
async fn broken_handler_does_not_block_healthy_one() {
    let tmp = tempfile::tempdir().unwrap();
    let broken = Flaky::new("broken", u32::MAX);
    let local: Arc<dyn StorageHandler> = Arc::new(LocalStorage::new(tmp.path()));
    let handlers: Vec<Arc<dyn StorageHandler>> = vec![broken.clone(), local];
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let (sender, worker) = collector::channel(config(), handlers, events);

    let mission = mission("east");
    for result in results(&mission) {
        sender.submit(result);
    }
    drop(sender);
    let report = worker.run().await;

    assert_eq!(report.stored, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(broken.attempts.lock().len(), 10);
    let written = std::fs::read_dir(tmp.path().join(mission.id.to_string()))
        .unwrap()
        .count();
    assert_eq!(written, 4);

    let mut failed = 0;
    let mut stored = 0;
    let mut queued = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            Event::InspectionQueued { .. } => queued += 1,
            Event::InspectionStored { handler, .. } => {
                assert_eq!(handler, "local");
                stored += 1;
            }
            Event::InspectionFailed { handler, error, .. } => {
                assert_eq!(handler, "broken");
                assert!(error.contains("broken is down"));
                failed += 1;
            }
            _ => {}
        }
    }
    assert_eq!((queued, stored, failed), (2, 2, 2));
}

#[tokio::test]
async fn full_inbox_reports_instead_of_blocking() {
    let config = CollectorConfig {
        inbox_capacity: 1,
        ..config()
    };
    let events = EventBus::new(16);
    let mut rx = events.subscribe();
    let (sender, worker) = collector::channel(config, Vec::new(), events);

    let mission = mission("west");
    for result in results(&mission) {
        sender.submit(result);
    }

    let mut dropped = 0;
    while let Ok(event) = rx.try_recv() {
        if let Event::InspectionFailed { handler, .. } = event {
            assert_eq!(handler, "collector");
            dropped += 1;
        }
    }
    assert_eq!(dropped, 1);
    drop(sender);
    let report = worker.run().await;
    assert_eq!(report, CollectorReport::default());
}

#[tokio::test]
async fn hanging_handler_times_out_without_stalling_the_collector() {
    let tmp = tempfile::tempdir().unwrap();
    let stuck: Arc<dyn StorageHandler> = Arc::new(Stuck);
    let local: Arc<dyn StorageHandler> = Arc::new(LocalStorage::new(tmp.path()));
    let config = CollectorConfig {
        max_retry_attempts: 1,
        store_timeout_ms: 50,
        ..config()
    };
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let (sender, worker) = collector::channel(config, vec![stuck, local], events);

    let mission = mission("north");
    for result in results(&mission) {
        sender.submit(result);
    }
    drop(sender);
    let report = tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .expect("collector stalled on a hanging handler");

    assert_eq!(report.stored, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.retries, 2);
    assert!(tmp.path().join(mission.id.to_string()).is_dir());

    let mut timed_out = 0;
    while let Ok(event) = rx.try_recv() {
        if let Event::InspectionFailed { handler, error, .. } = event {
            assert_eq!(handler, "stuck");
            assert!(error.contains("did not answer within 50ms"), "{error}");
            timed_out += 1;
        }
    }
    assert_eq!(timed_out, 2);
}
