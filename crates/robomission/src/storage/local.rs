use crate::error::StorageError;
use crate::model::InspectionResult;
use crate::storage::{StorageHandler, StoredLocation};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes inspections under `<root>/<mission_id>/`.
///
/// Data files are written first and the `<stem>.json` metadata file last, so a
/// metadata file on disk always describes complete data files. Storing the same
/// inspection twice overwrites the earlier copy.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn mission_dir(&self, result: &InspectionResult) -> PathBuf {
        self.root.join(result.mission_id.to_string())
    }
}

#[async_trait]
impl StorageHandler for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn store(&self, result: &InspectionResult) -> Result<StoredLocation, StorageError> {
        let dir = self.mission_dir(result);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| StorageError::io(&dir, err))?;

        for file in &result.files {
            let path = dir.join(&file.file_name);
            tokio::fs::write(&path, &file.data)
                .await
                .map_err(|err| StorageError::io(&path, err))?;
        }

        let metadata = serde_json::to_vec_pretty(&result.metadata())?;
        let metadata_path = dir.join(result.metadata_file_name());
        tokio::fs::write(&metadata_path, metadata)
            .await
            .map_err(|err| StorageError::io(&metadata_path, err))?;

        debug!(
            inspection = %result.id,
            files = result.files.len(),
            dir = %dir.display(),
            "stored inspection locally"
        );
        Ok(StoredLocation(dir.display().to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{
        checksum, CapturedArtifact, Frame, InspectionMetadata, MediaType, Mission, Pose, Position,
        Task,
    };

    fn sample_result(media: &[MediaType]) -> InspectionResult {
        let pose = Pose::at(Position::new(2.0, 1.0, 0.0, Frame::Asset));
        let task = Task::take_image(pose, Position::new(2.0, 2.0, 1.0, Frame::Asset))
            .with_tag("pump-7");
        let mission = Mission::new("tank inspection", vec![task.clone()]);
        let artifacts = media
            .iter()
            .map(|m| CapturedArtifact::new(*m, format!("{m} bytes")))
            .collect();
        InspectionResult::from_capture(&mission, &task, pose, artifacts)
    }

    #[tokio::test]
    async fn writes_data_then_metadata_into_mission_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let result = sample_result(&[MediaType::Image]);

        let location = storage.store(&result).await.unwrap();
        let dir = tmp.path().join(result.mission_id.to_string());
        assert_eq!(location.0, dir.display().to_string());

        let data_name = format!("{}.jpeg", result.file_stem());
        let data = std::fs::read(dir.join(&data_name)).unwrap();
        assert_eq!(data, b"image bytes");

        let raw = std::fs::read_to_string(dir.join(result.metadata_file_name())).unwrap();
        let metadata: InspectionMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(metadata.tag.as_deref(), Some("pump-7"));
        let file = &metadata.data[0].files[0];
        assert_eq!(file.file_name, data_name);
        assert_eq!(file.checksum, checksum(b"image bytes"));
        assert!((file.x - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn multiple_files_get_indexed_names() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let result = sample_result(&[MediaType::Image, MediaType::ThermalImage]);

        storage.store(&result).await.unwrap();
        let dir = storage.mission_dir(&result);
        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let stem = result.file_stem();
        assert_eq!(
            names,
            vec![
                format!("{stem}.json"),
                format!("{stem}_0.jpeg"),
                format!("{stem}_1.jpeg"),
            ]
        );
    }

    #[tokio::test]
    async fn unwritable_root_reports_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let storage = LocalStorage::new(&blocker);

        let err = storage.store(&sample_result(&[MediaType::Image])).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
