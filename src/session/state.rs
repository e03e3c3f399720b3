//! Session state and its serializable view

use super::status::StatusReport;
use crate::capture::MediaSource;
use crate::compositor::Composition;
use serde::{Deserialize, Serialize};

/// Sources held by the session. Recording state lives in the recorder;
/// `SessionController::snapshot` is the combined view of both.
#[derive(Debug, Default)]
pub struct SessionState {
    pub screen: Option<MediaSource>,
    pub camera: Option<MediaSource>,
    pub composition: Option<Composition>,
}

impl SessionState {
    pub fn screen_live(&self) -> bool {
        self.screen.as_ref().map(MediaSource::is_live).unwrap_or(false)
    }

    pub fn camera_live(&self) -> bool {
        self.camera.as_ref().map(MediaSource::is_live).unwrap_or(false)
    }

    pub fn combined(&self) -> bool {
        self.composition.as_ref().map(Composition::is_live).unwrap_or(false)
    }

    /// Stop and release everything held, leaving the state empty
    pub fn release_all(&mut self) {
        if let Some(composition) = self.composition.take() {
            composition.stop();
        }
        if let Some(screen) = self.screen.take() {
            screen.stop();
        }
        if let Some(camera) = self.camera.take() {
            camera.stop();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.screen.is_none() && self.camera.is_none() && self.composition.is_none()
    }
}

/// What the UI needs to render the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub screen_live: bool,
    pub camera_live: bool,
    pub combined: bool,
    pub recording: bool,
    pub elapsed_secs: u64,
    /// `MM:SS`
    pub elapsed_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusReport>,
}
