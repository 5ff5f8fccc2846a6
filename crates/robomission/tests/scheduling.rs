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

//! Starting predefined missions through the scheduling entry point.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use robomission::mission_source::{MissionDefinition, MissionSource, PredefinedMissions};
use robomission::storage::{LocalStorage, StorageHandler};
use robomission::{
    MissionStatus, RejectionError, Service, Settings, SimulatedDriver, SimulatedOutcome,
    SimulationConfig, State,
};

const WAIT: Duration = Duration::from_secs(10);

const INSPECTION_YAML: &str = r"
name: pump house
tasks:
  - type: take_image
    tag: pump-1
    pose:
      position: { x: 1.0, y: 1.0, z: 0.0 }
    target: { x: 1.0, y: 2.0, z: 1.0 }
  - type: record_audio
    pose:
      position: { x: 2.0, y: 1.0, z: 0.0 }
    target: { x: 2.0, y: 2.0, z: 1.0 }
    duration_s: 5
  - type: return_to_home
    pose:
      position: { x: 0.0, y: 0.0, z: 0.0 }
";

fn write_missions(dir: &Path) {
    fs::write(dir.join("pump_house.yaml"), INSPECTION_YAML).unwrap();
    fs::write(dir.join("empty.json"), r#"{ "name": "empty", "tasks": [] }"#).unwrap();
    fs::write(
        dir.join("bad_kind.json"),
        r#"{ "name": "bad", "tasks": [{ "type": "dance", "pose": { "position": { "x": 0, "y": 0, "z": 0 } } }] }"#,
    )
    .unwrap();
    fs::write(dir.join("broken.json"), "{ not json").unwrap();
}

fn start(missions: &Path, results: &Path, driver: Arc<SimulatedDriver>) -> Service {
    let mut settings = Settings {
        results_root: results.to_path_buf(),
        predefined_missions_folder: missions.to_path_buf(),
        ..Settings::default()
    };
    settings.machine.poll_interval_ms = 5;
    let storage: Arc<dyn StorageHandler> = Arc::new(LocalStorage::new(results));
    let source = Arc::new(PredefinedMissions::new(missions));
    Service::start(&settings, driver, source, vec![storage])
}

fn fast_driver() -> Arc<SimulatedDriver> {
    Arc::new(SimulatedDriver::new(SimulationConfig {
        task_duration: Duration::from_millis(10),
        ..SimulationConfig::default()
    }))
}

#[tokio::test]
async fn predefined_mission_runs_to_completion() {
    let missions = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    write_missions(missions.path());
    let service = start(missions.path(), results.path(), fast_driver());

    let accepted = service
        .scheduling()
        .start_mission("pump_house")
        .await
        .unwrap();
    assert_eq!(accepted.definition_id.as_deref(), Some("pump_house"));
    assert_eq!(accepted.tasks, 3);
    assert_ne!(service.scheduling().current_state(), State::Idle);

    let finished = service
        .machine()
        .wait_for_mission(accepted.mission_id, WAIT)
        .await
        .unwrap();
    assert_eq!(finished.status, MissionStatus::Successful);
    assert!(service.scheduling().current_mission().is_none());

    let report = service.shutdown().await;
    assert_eq!(report.stored, 2);
    let dir = results.path().join(accepted.mission_id.to_string());
    let mut extensions: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let path = e.unwrap().path();
            path.extension().unwrap().to_string_lossy().into_owned()
        })
        .collect();
    extensions.sort();
    assert_eq!(extensions, vec!["jpeg", "json", "json", "wav"]);
}

#[tokio::test]
async fn malformed_definitions_are_rejected_before_scheduling() {
    let missions = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    write_missions(missions.path());
    let service = start(missions.path(), results.path(), fast_driver());
    let scheduling = service.scheduling();

    assert!(matches!(
        scheduling.start_mission("nope").await,
        Err(RejectionError::MissionNotFound { id }) if id == "nope"
    ));
    assert!(matches!(
        scheduling.start_mission("empty").await,
        Err(RejectionError::EmptyMission { id }) if id == "empty"
    ));
    assert!(matches!(
        scheduling.start_mission("bad_kind").await,
        Err(RejectionError::UnknownTaskKind { kind }) if kind == "dance"
    ));
    assert!(matches!(
        scheduling.start_mission("broken").await,
        Err(RejectionError::InvalidDefinition { .. })
    ));
    assert_eq!(scheduling.current_state(), State::Idle);
    service.shutdown().await;
}

#[tokio::test]
async fn start_while_running_is_rejected_and_stop_cancels() {
    let missions = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    write_missions(missions.path());
    let driver = fast_driver();
    driver.push_outcome(SimulatedOutcome::Hang);
    let service = start(missions.path(), results.path(), driver);
    let scheduling = service.scheduling();

    let first = scheduling.start_mission("pump_house").await.unwrap();
    let second = scheduling.start_mission("pump_house").await.unwrap_err();
    assert_eq!(
        second,
        RejectionError::AlreadyRunning {
            mission_id: first.mission_id
        }
    );

    assert_eq!(scheduling.stop_mission().await.unwrap(), first.mission_id);
    let finished = service
        .machine()
        .wait_for_mission(first.mission_id, WAIT)
        .await
        .unwrap();
    assert_eq!(finished.status, MissionStatus::Cancelled);
    service.shutdown().await;
}

#[tokio::test]
async fn ad_hoc_definitions_can_be_started() {
    let missions = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    write_missions(missions.path());
    let service = start(missions.path(), results.path(), fast_driver());

    let source = PredefinedMissions::new(missions.path());
    let listed: Vec<String> = source
        .list_missions()
        .unwrap()
        .into_iter()
        .map(|summary| summary.id)
        .collect();
    assert_eq!(listed, vec!["empty", "pump_house"]);

    let path = missions.path().join("pump_house.yaml");
    let definition = MissionDefinition::load_file(&path).unwrap();
    let accepted = service
        .scheduling()
        .start_mission_definition(&definition)
        .await
        .unwrap();
    assert_eq!(accepted.definition_id.as_deref(), Some("adhoc"));
    assert_eq!(accepted.name, "pump house");
    let finished = service
        .machine()
        .wait_for_mission(accepted.mission_id, WAIT)
        .await
        .unwrap();
    assert_eq!(finished.status, MissionStatus::Successful);
    service.shutdown().await;
}
