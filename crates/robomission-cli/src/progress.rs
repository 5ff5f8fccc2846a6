//! Per-task progress output using indicatif.

use indicatif::{ProgressBar, ProgressStyle};
use robomission::{Event, MissionId, MissionStatus, TaskStatus};
use std::io::Write;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// Renders mission events on stderr, one spinner per running task.
pub struct MissionProgress {
    mission_id: MissionId,
    spinner: Option<ProgressBar>,
    total_tasks: usize,
    current: String,
}

impl MissionProgress {
    pub fn new(mission_id: MissionId) -> Self {
        Self {
            mission_id,
            spinner: None,
            total_tasks: 0,
            current: String::new(),
        }
    }

    /// Consume events until the mission finishes or the bus closes.
    pub async fn follow(mut self, mut events: broadcast::Receiver<Event>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if self.on_event(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
        self.clear();
    }

    /// Returns `true` once the followed mission has finished.
    fn on_event(&mut self, event: &Event) -> bool {
        match event {
            Event::MissionStarted {
                mission_id,
                name,
                total_tasks,
            } if *mission_id == self.mission_id => {
                self.total_tasks = *total_tasks;
                let _ = writeln!(
                    std::io::stderr(),
                    "mission started: {name} ({total_tasks} tasks)"
                );
            }
            Event::TaskStarted {
                mission_id,
                index,
                kind,
                ..
            } if *mission_id == self.mission_id => {
                self.clear();
                let total = self.total_tasks;
                self.current = format!("[{index}/{total}] {kind}");
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.set_message(self.current.clone());
                pb.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(pb);
            }
            Event::TaskRetrying {
                mission_id,
                attempt,
                reason,
                ..
            } if *mission_id == self.mission_id => {
                if let Some(pb) = &self.spinner {
                    let current = &self.current;
                    pb.set_message(format!("{current} (retry after attempt {attempt}: {reason})"));
                }
            }
            Event::TaskFinished {
                mission_id, status, ..
            } if *mission_id == self.mission_id => {
                self.clear();
                let icon = match status {
                    TaskStatus::Successful => "\x1b[32m✓\x1b[0m",
                    TaskStatus::PartiallySuccessful => "\x1b[33m~\x1b[0m",
                    TaskStatus::Failed => "\x1b[31m✗\x1b[0m",
                    TaskStatus::NotStarted | TaskStatus::InProgress => "\x1b[33m-\x1b[0m",
                };
                let _ = writeln!(std::io::stderr(), "  {icon} {}", self.current);
            }
            Event::MissionFinished { mission } if mission.id == self.mission_id => {
                self.clear();
                let status_msg = match mission.status {
                    MissionStatus::Successful => "\x1b[32msuccessful\x1b[0m".to_string(),
                    MissionStatus::PartiallySuccessful => {
                        "\x1b[33mpartially successful\x1b[0m".to_string()
                    }
                    other => format!("\x1b[31m{other}\x1b[0m"),
                };
                let _ = writeln!(
                    std::io::stderr(),
                    "mission {status_msg}: {}/{} tasks finished",
                    mission.finished_tasks(),
                    mission.tasks.len()
                );
                return true;
            }
            _ => {}
        }
        false
    }

    fn clear(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}
