//! Remote file handles owned by the hosted ingestion service.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisResult;

/// Processing state reported by the hosted service for an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FileState {
    #[serde(rename = "STATE_UNSPECIFIED")]
    #[default]
    Unspecified,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "FAILED")]
    Failed,
}

impl FileState {
    pub fn is_pending(self) -> bool {
        self == FileState::Processing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

/// Opaque reference to an uploaded asset. Polled, never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`.
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: FileState,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// Hosted file ingestion endpoint.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Submits the file at `path` and returns the handle as first reported.
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> AnalysisResult<RemoteFile>;

    /// Fetches the current state of a previously uploaded file.
    async fn get_file(&self, name: &str) -> AnalysisResult<RemoteFile>;
}
