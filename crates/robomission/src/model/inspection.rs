use crate::model::{InspectionId, Mission, MissionId, Pose, Task, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media captured by an inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    ThermalImage,
    Video,
    Audio,
}

impl MediaType {
    /// File extension used when the media is written to disk.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image | Self::ThermalImage => "jpeg",
            Self::Video => "mp4",
            Self::Audio => "wav",
        }
    }

    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Image | Self::ThermalImage => "image/jpeg",
            Self::Video => "video/mp4",
            Self::Audio => "audio/wav",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Image => "image",
            Self::ThermalImage => "thermal_image",
            Self::Video => "video",
            Self::Audio => "audio",
        };
        write!(f, "{s}")
    }
}

/// Raw artifact handed over by the robot driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedArtifact {
    pub media_type: MediaType,
    pub data: Vec<u8>,
}

impl CapturedArtifact {
    #[must_use]
    pub fn new(media_type: MediaType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            media_type,
            data: data.into(),
        }
    }
}

/// A named data file belonging to an inspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionFile {
    pub file_name: String,
    pub media_type: MediaType,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Captured artifacts of one completed task plus the pose they were taken at.
///
/// Immutable once built. Ownership moves to the result collector on submit and
/// ends when every storage handler has persisted it or given up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub id: InspectionId,
    pub mission_id: MissionId,
    pub mission_name: String,
    pub task_id: TaskId,
    pub task_kind: String,
    pub tag: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub pose_at_capture: Pose,
    pub files: Vec<InspectionFile>,
}

impl InspectionResult {
    /// Build a result for `task`, naming each artifact after the task kind and inspection id.
    #[must_use]
    pub fn from_capture(
        mission: &Mission,
        task: &Task,
        pose_at_capture: Pose,
        artifacts: Vec<CapturedArtifact>,
    ) -> Self {
        let id = InspectionId::new();
        let stem = file_stem(task.kind.name(), &id);
        let single = artifacts.len() == 1;
        let files = artifacts
            .into_iter()
            .enumerate()
            .map(|(index, artifact)| {
                let ext = artifact.media_type.extension();
                let file_name = if single {
                    format!("{stem}.{ext}")
                } else {
                    format!("{stem}_{index}.{ext}")
                };
                InspectionFile {
                    file_name,
                    media_type: artifact.media_type,
                    data: artifact.data,
                }
            })
            .collect();
        Self {
            id,
            mission_id: mission.id,
            mission_name: mission.name.clone(),
            task_id: task.id,
            task_kind: task.kind.name().to_string(),
            tag: task.tag.clone(),
            captured_at: Utc::now(),
            pose_at_capture,
            files,
        }
    }

    /// Base name shared by the metadata file and the data files.
    #[must_use]
    pub fn file_stem(&self) -> String {
        file_stem(&self.task_kind, &self.id)
    }

    #[must_use]
    pub fn metadata_file_name(&self) -> String {
        format!("{}.json", self.file_stem())
    }

    /// Metadata document persisted next to the data files.
    #[must_use]
    pub fn metadata(&self) -> InspectionMetadata {
        let position = self.pose_at_capture.position;
        let files = self
            .files
            .iter()
            .map(|file| FileMetadata {
                file_name: file.file_name.clone(),
                media_type: file.media_type,
                checksum: checksum(&file.data),
                x: position.x,
                y: position.y,
                z: position.z,
                frame: position.frame,
            })
            .collect();
        InspectionMetadata {
            mission_id: self.mission_id,
            mission_name: self.mission_name.clone(),
            inspection_id: self.id,
            task_id: self.task_id,
            task_kind: self.task_kind.clone(),
            tag: self.tag.clone(),
            captured_at: self.captured_at,
            data: vec![MetadataEntry { files }],
        }
    }
}

fn file_stem(task_kind: &str, id: &InspectionId) -> String {
    format!("{task_kind}_{id}")
}

/// On-disk metadata for one inspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectionMetadata {
    pub mission_id: MissionId,
    pub mission_name: String,
    pub inspection_id: InspectionId,
    pub task_id: TaskId,
    pub task_kind: String,
    pub tag: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub data: Vec<MetadataEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub files: Vec<FileMetadata>,
}

/// Per-file record: name, integrity checksum and the pose at capture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub media_type: MediaType,
    pub checksum: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub frame: crate::model::Frame,
}

/// FNV-1a 64 digest of `data`, hex encoded.
#[must_use]
pub fn checksum(data: &[u8]) -> String {
    format!("{:016x}", fnv1a_hash(data))
}

fn fnv1a_hash(data: &[u8]) -> u64 {
    // FNV-1a constants (64-bit)
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    let mut hash: u64 = FNV_OFFSET_BASIS;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{Frame, Position};

    fn mission_with_image_task() -> Mission {
        let pose = Pose::at(Position::new(1.0, 2.0, 0.0, Frame::Asset));
        let target = Position::new(2.0, 2.0, 1.0, Frame::Asset);
        Mission::new("unit", vec![Task::take_image(pose, target).with_tag("gauge")])
    }

    #[test]
    fn single_artifact_uses_plain_stem() {
        let mission = mission_with_image_task();
        let Some(task) = mission.tasks.first() else {
            return;
        };
        let result = InspectionResult::from_capture(
            &mission,
            task,
            task.pose,
            vec![CapturedArtifact::new(MediaType::Image, b"jpeg".to_vec())],
        );
        let stem = result.file_stem();
        assert!(stem.starts_with("take_image_"));
        assert_eq!(result.files.len(), 1);
        assert_eq!(
            result.files.first().map(|f| f.file_name.clone()),
            Some(format!("{stem}.jpeg"))
        );
        assert_eq!(result.metadata_file_name(), format!("{stem}.json"));
    }

    #[test]
    fn multiple_artifacts_are_numbered() {
        let mission = mission_with_image_task();
        let Some(task) = mission.tasks.first() else {
            return;
        };
        let result = InspectionResult::from_capture(
            &mission,
            task,
            task.pose,
            vec![
                CapturedArtifact::new(MediaType::Image, b"a".to_vec()),
                CapturedArtifact::new(MediaType::ThermalImage, b"b".to_vec()),
            ],
        );
        let names: Vec<_> = result.files.iter().map(|f| f.file_name.clone()).collect();
        let stem = result.file_stem();
        assert_eq!(names, vec![format!("{stem}_0.jpeg"), format!("{stem}_1.jpeg")]);
    }

    #[test]
    fn metadata_records_pose_for_every_file() {
        let mission = mission_with_image_task();
        let Some(task) = mission.tasks.first() else {
            return;
        };
        let captured = Pose::at(Position::new(1.05, 1.98, 0.0, Frame::Asset));
        let result = InspectionResult::from_capture(
            &mission,
            task,
            captured,
            vec![CapturedArtifact::new(MediaType::Image, b"pixels".to_vec())],
        );
        let metadata = result.metadata();
        let value = serde_json::to_value(&metadata).unwrap_or_default();
        let file = &value["data"][0]["files"][0];
        let file_name = result.files.first().map(|f| f.file_name.clone());
        assert_eq!(file["file_name"], file_name.unwrap_or_default());
        assert_eq!(file["x"], 1.05);
        assert_eq!(file["y"], 1.98);
        assert_eq!(file["z"], 0.0);
        assert_eq!(file["frame"], "asset");
        assert_eq!(file["checksum"], checksum(b"pixels"));
        assert_eq!(value["tag"], "gauge");
    }

    #[test]
    fn checksum_is_stable_fnv1a() {
        assert_eq!(checksum(b""), "cbf29ce484222325");
        assert_ne!(checksum(b"a"), checksum(b"b"));
    }
}
