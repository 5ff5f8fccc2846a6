//! Destinations for inspection results.
//!
//! The collector hands every result to every registered [`StorageHandler`] and
//! retries failed calls with backoff, so a handler only has to make a single
//! attempt and report what went wrong.

pub mod local;

pub use local::LocalStorage;

use crate::error::StorageError;
use crate::model::InspectionResult;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Where a handler put an inspection, e.g. a directory or an object key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredLocation(pub String);

impl fmt::Display for StoredLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// Name used in logs and events. Must be unique among registered handlers.
    fn name(&self) -> &str;

    async fn store(&self, result: &InspectionResult) -> Result<StoredLocation, StorageError>;
}

#[async_trait]
impl<T: StorageHandler + ?Sized> StorageHandler for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn store(&self, result: &InspectionResult) -> Result<StoredLocation, StorageError> {
        (**self).store(result).await
    }
}
