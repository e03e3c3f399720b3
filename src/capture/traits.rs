//! Capture trait definitions
//!
//! Platform-agnostic interface the core uses to obtain live sources from the
//! host. Backends implement `SourceProvider`; the acquirer only talks to it.

use super::source::MediaSource;
use crate::utils::error::ErrorKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while acquiring a source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No source found: {0}")]
    NoSourceFound(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Cancelled: {0}")]
    UserCancelled(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            CaptureError::NoSourceFound(_) => ErrorKind::NoSourceFound,
            CaptureError::Unsupported(_) => ErrorKind::Unsupported,
            CaptureError::UserCancelled(_) => ErrorKind::UserCancelled,
            CaptureError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
        }
    }
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Host platform, used for capability hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Windows,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::Macos,
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            _ => Platform::Other,
        }
    }
}

/// Kinds of desktop sources a host can enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesktopSourceType {
    Screen,
    Window,
}

/// A screen or window the host offers for capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopSource {
    pub id: String,
    pub name: String,
}

/// Information about a display/screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    /// Unique display ID
    pub id: u32,

    /// Display name
    pub name: String,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Whether this is the primary display
    pub is_primary: bool,
}

impl From<&DisplayInfo> for DesktopSource {
    fn from(display: &DisplayInfo) -> Self {
        Self {
            id: display.id.to_string(),
            name: display.name.clone(),
        }
    }
}

/// Constraints for a screen capture request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenConstraints {
    /// Whether to capture desktop audio alongside the video
    pub audio: bool,

    /// Upper bound on capture width
    pub max_width: Option<u32>,

    /// Upper bound on capture height
    pub max_height: Option<u32>,

    /// Preferred frame rate
    pub ideal_frame_rate: Option<u32>,

    /// Upper bound on frame rate
    pub max_frame_rate: Option<u32>,
}

impl ScreenConstraints {
    /// Plain video request with no size or rate constraints
    pub fn video_only() -> Self {
        Self {
            audio: false,
            max_width: None,
            max_height: None,
            ideal_frame_rate: None,
            max_frame_rate: None,
        }
    }
}

/// Constraints for a camera capture request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_frame_rate: u32,
    pub audio: bool,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            ideal_frame_rate: 30,
            audio: true,
        }
    }
}

/// Host capture capability
///
/// Two screen paths exist: the platform-native one (enumerate desktop sources,
/// then capture one by id) and the generic display-capture request where the
/// host picks the source. Either may be unavailable.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Host platform
    fn platform(&self) -> Platform {
        Platform::current()
    }

    /// Whether desktop sources can be enumerated and captured by id
    fn supports_desktop_sources(&self) -> bool;

    /// Whether the generic display-capture request is available
    fn supports_display_media(&self) -> bool;

    /// List desktop sources of the requested types
    async fn desktop_sources(&self, types: &[DesktopSourceType]) -> CaptureResult<Vec<DesktopSource>>;

    /// Capture a previously enumerated desktop source
    async fn capture_desktop_source(
        &self,
        source: &DesktopSource,
        constraints: &ScreenConstraints,
    ) -> CaptureResult<MediaSource>;

    /// Generic display-capture request
    async fn display_media(&self, constraints: &ScreenConstraints) -> CaptureResult<MediaSource>;

    /// Open the camera (and microphone, if requested)
    async fn user_media(&self, constraints: &CameraConstraints) -> CaptureResult<MediaSource>;
}
