//! Persisting finished recordings
//!
//! A `PersistenceSink` writes the sealed blob somewhere: through the host
//! save dialog on desktop, or into the download directory otherwise. The
//! gateway picks the sink and turns the outcome into a `SaveResult`.

pub mod download;

#[cfg(feature = "desktop")]
pub mod dialog;

pub use download::DownloadSink;

#[cfg(feature = "desktop")]
pub use dialog::DialogSink;

use crate::recorder::RecordingBlob;
use crate::utils::error::ErrorKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Title of the host save dialog
pub const SAVE_DIALOG_TITLE: &str = "Save Video";

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Save dialog canceled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

impl PersistenceError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PersistenceFailure
    }
}

/// `recording-<epoch millis>.webm`
pub fn default_file_name(at: DateTime<Utc>) -> String {
    format!("recording-{}.webm", at.timestamp_millis())
}

/// The user's documents directory
pub fn documents_dir() -> Option<PathBuf> {
    dirs::document_dir()
}

/// A named group of file extensions offered by the save dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// What to ask the sink for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub file_name: String,
    pub title: String,
    pub filters: Vec<FileFilter>,
}

impl SaveRequest {
    /// A WebM save request named after `at`
    pub fn for_recording(at: DateTime<Utc>) -> Self {
        Self {
            file_name: default_file_name(at),
            title: SAVE_DIALOG_TITLE.to_string(),
            filters: vec![
                FileFilter::new("WebM Video", &["webm"]),
                FileFilter::new("All Files", &["*"]),
            ],
        }
    }
}

/// How a recording ended up on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMethod {
    Dialog,
    Download,
}

/// Outcome reported back to the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    pub success: bool,
    pub method: SaveMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A place recordings can be written to
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    fn method(&self) -> SaveMethod;

    /// Write `bytes`, returning where they landed
    async fn save(&self, request: &SaveRequest, bytes: Arc<[u8]>) -> Result<PathBuf, PersistenceError>;
}

/// Routes finished recordings to the dialog sink when there is one, else to
/// the download sink
#[derive(Clone)]
pub struct PersistenceGateway {
    dialog: Option<Arc<dyn PersistenceSink>>,
    download: Arc<dyn PersistenceSink>,
}

impl PersistenceGateway {
    pub fn new(download: Arc<dyn PersistenceSink>) -> Self {
        Self {
            dialog: None,
            download,
        }
    }

    pub fn with_dialog(mut self, dialog: Arc<dyn PersistenceSink>) -> Self {
        self.dialog = Some(dialog);
        self
    }

    pub fn has_dialog(&self) -> bool {
        self.dialog.is_some()
    }

    /// Save a sealed recording under the default file name
    pub async fn save(&self, blob: &RecordingBlob) -> SaveResult {
        self.save_request(&SaveRequest::for_recording(Utc::now()), blob).await
    }

    pub async fn save_request(&self, request: &SaveRequest, blob: &RecordingBlob) -> SaveResult {
        let sink = self.dialog.as_ref().unwrap_or(&self.download);
        let method = sink.method();

        match sink.save(request, blob.bytes.clone()).await {
            Ok(path) => {
                tracing::info!("Saved {} bytes to {:?}", blob.len(), path);
                SaveResult {
                    success: true,
                    method,
                    path: Some(path.to_string_lossy().to_string()),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!("Failed to save recording: {}", e);
                SaveResult {
                    success: false,
                    method,
                    path: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
