//! Mission definitions and where they come from.
//!
//! A definition is a template: every load turns it into a fresh [`Mission`]
//! with its own id, so the same definition can be run again and again.

use crate::error::LoadError;
use crate::model::{Mission, Pose, Task, TaskKind, TASK_KIND_NAMES};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionDefinition {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub tasks: Vec<TaskDefinition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(flatten)]
    pub kind: TaskKind,
    pub pose: Pose,
    #[serde(default)]
    pub tag: Option<String>,
}

impl MissionDefinition {
    /// Parse a definition, reporting an unknown task `type` by name.
    pub fn from_value(value: Value, origin: &Path) -> Result<Self, LoadError> {
        if let Some(tasks) = value.get("tasks").and_then(Value::as_array) {
            for (index, task) in tasks.iter().enumerate() {
                match task.get("type").and_then(Value::as_str) {
                    Some(kind) if !TASK_KIND_NAMES.contains(&kind) => {
                        return Err(LoadError::UnknownTaskKind {
                            kind: kind.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        return Err(LoadError::Invalid {
                            reason: format!("task {} has no 'type'", index + 1),
                        });
                    }
                }
            }
        }
        serde_json::from_value(value).map_err(|err| LoadError::Parse {
            path: origin.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Read a JSON or YAML definition file, chosen by extension.
    pub fn load_file(path: &Path) -> Result<Self, LoadError> {
        let data = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| LoadError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let value: Value = if is_yaml(path) {
            serde_yml::from_str(&data).map_err(|err| parse_error(err.to_string()))?
        } else {
            serde_json::from_str(&data).map_err(|err| parse_error(err.to_string()))?
        };
        Self::from_value(value, path)
    }

    /// Build a runnable mission. `fallback_id` becomes the definition id when
    /// the document does not name one.
    #[must_use]
    pub fn to_mission(&self, fallback_id: &str) -> Mission {
        let tasks = self
            .tasks
            .iter()
            .map(|def| {
                let task = Task::new(def.kind.clone(), def.pose);
                match &def.tag {
                    Some(tag) => task.with_tag(tag.clone()),
                    None => task,
                }
            })
            .collect();
        let definition_id = self.id.clone().unwrap_or_else(|| fallback_id.to_string());
        Mission::new(self.name.clone(), tasks).with_definition_id(definition_id)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

/// One entry of [`MissionSource::list_missions`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MissionSummary {
    pub id: String,
    pub name: String,
    pub tasks: usize,
}

pub trait MissionSource: Send + Sync {
    /// Load definition `id` as a new mission.
    fn load_mission(&self, id: &str) -> Result<Mission, LoadError>;

    /// Every readable definition, sorted by id.
    fn list_missions(&self) -> Result<Vec<MissionSummary>, LoadError>;
}

/// Definitions stored as `<folder>/<id>.json`, `.yaml` or `.yml`.
#[derive(Clone, Debug)]
pub struct PredefinedMissions {
    folder: PathBuf,
}

impl PredefinedMissions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return None;
        }
        EXTENSIONS
            .iter()
            .map(|ext| self.folder.join(format!("{id}.{ext}")))
            .find(|path| path.is_file())
    }
}

impl MissionSource for PredefinedMissions {
    fn load_mission(&self, id: &str) -> Result<Mission, LoadError> {
        let path = self.path_for(id).ok_or_else(|| LoadError::NotFound {
            id: id.to_string(),
        })?;
        let definition = MissionDefinition::load_file(&path)?;
        Ok(definition.to_mission(id))
    }

    fn list_missions(&self) -> Result<Vec<MissionSummary>, LoadError> {
        let entries = fs::read_dir(&self.folder).map_err(|source| LoadError::Io {
            path: self.folder.clone(),
            source,
        })?;
        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext));
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !known || !path.is_file() {
                continue;
            }
            let definition = match MissionDefinition::load_file(&path) {
                Ok(definition) => definition,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable mission definition"
                    );
                    continue;
                }
            };
            summaries.push(MissionSummary {
                id: id.to_string(),
                name: definition.name,
                tasks: definition.tasks.len(),
            });
        }
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }
}

/// In-memory definitions, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct StaticMissions {
    definitions: BTreeMap<String, MissionDefinition>,
}

impl StaticMissions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mission(mut self, id: impl Into<String>, definition: MissionDefinition) -> Self {
        self.insert(id, definition);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, definition: MissionDefinition) {
        self.definitions.insert(id.into(), definition);
    }
}

impl MissionSource for StaticMissions {
    fn load_mission(&self, id: &str) -> Result<Mission, LoadError> {
        self.definitions
            .get(id)
            .map(|definition| definition.to_mission(id))
            .ok_or_else(|| LoadError::NotFound { id: id.to_string() })
    }

    fn list_missions(&self) -> Result<Vec<MissionSummary>, LoadError> {
        Ok(self
            .definitions
            .iter()
            .map(|(id, definition)| MissionSummary {
                id: id.clone(),
                name: definition.name.clone(),
                tasks: definition.tasks.len(),
            })
            .collect())
    }
}
