//! Wiring of the two long-lived workers: the state machine and the result collector.

use crate::collector::{self, CollectorReport};
use crate::config::Settings;
use crate::driver::RobotDriver;
use crate::events::EventBus;
use crate::machine::{StateMachine, StateMachineHandle};
use crate::mission_source::{MissionSource, PredefinedMissions};
use crate::scheduling::SchedulingUtilities;
use crate::storage::{LocalStorage, StorageHandler};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;

/// Running service. Must be created inside a tokio runtime.
pub struct Service {
    events: EventBus,
    machine: StateMachineHandle,
    scheduling: SchedulingUtilities,
    machine_worker: JoinHandle<()>,
    collector_worker: JoinHandle<CollectorReport>,
}

impl Service {
    pub fn start(
        settings: &Settings,
        driver: Arc<dyn RobotDriver>,
        source: Arc<dyn MissionSource>,
        handlers: Vec<Arc<dyn StorageHandler>>,
    ) -> Self {
        let events = EventBus::new(settings.event_capacity);
        let (results, collector) =
            collector::channel(settings.collector.clone(), handlers, events.clone());
        let collector_worker = tokio::spawn(collector.run());
        let (machine, machine_worker) =
            StateMachine::spawn(settings.machine.clone(), driver, results, events.clone());
        let scheduling = SchedulingUtilities::new(source, machine.clone());
        Self {
            events,
            machine,
            scheduling,
            machine_worker,
            collector_worker,
        }
    }

    /// Predefined missions and local storage taken from `settings`.
    pub fn from_settings(settings: &Settings, driver: Arc<dyn RobotDriver>) -> Self {
        let source = Arc::new(PredefinedMissions::new(
            settings.predefined_missions_folder.clone(),
        ));
        let storage: Arc<dyn StorageHandler> =
            Arc::new(LocalStorage::new(settings.results_root.clone()));
        Self::start(settings, driver, source, vec![storage])
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn machine(&self) -> &StateMachineHandle {
        &self.machine
    }

    #[must_use]
    pub fn scheduling(&self) -> &SchedulingUtilities {
        &self.scheduling
    }

    /// Stop any active mission, end the state machine, then let the collector
    /// drain everything already submitted.
    pub async fn shutdown(self) -> CollectorReport {
        self.machine.shutdown().await;
        if let Err(err) = self.machine_worker.await {
            error!(error = %err, "state machine worker failed");
        }
        match self.collector_worker.await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "result collector worker failed");
                CollectorReport::default()
            }
        }
    }
}
