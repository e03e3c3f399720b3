//! Recorder settings
//!
//! Every field has a default, so a partial or missing settings file still
//! yields a complete configuration.

use crate::capture::traits::{CameraConstraints, ScreenConstraints};
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the settings file inside the config directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderSettings {
    pub capture: CaptureSettings,
    pub compositor: CompositorSettings,
    pub recording: RecordingSettings,
    pub output: OutputSettings,
}

/// Source acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub screen_max_width: u32,
    pub screen_max_height: u32,
    pub screen_ideal_frame_rate: u32,
    pub screen_max_frame_rate: u32,
    /// Frame rate cap on the platform-native capture path
    pub native_max_frame_rate: u32,
    pub request_screen_audio: bool,
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_frame_rate: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            screen_max_width: 1920,
            screen_max_height: 1080,
            screen_ideal_frame_rate: 30,
            screen_max_frame_rate: 60,
            native_max_frame_rate: 30,
            request_screen_audio: true,
            camera_width: 640,
            camera_height: 480,
            camera_frame_rate: 30,
        }
    }
}

impl CaptureSettings {
    /// Constraints for the generic display-capture request
    pub fn display_constraints(&self) -> ScreenConstraints {
        ScreenConstraints {
            audio: self.request_screen_audio,
            max_width: Some(self.screen_max_width),
            max_height: Some(self.screen_max_height),
            ideal_frame_rate: Some(self.screen_ideal_frame_rate),
            max_frame_rate: Some(self.screen_max_frame_rate),
        }
    }

    /// Constraints for capturing an enumerated desktop source
    pub fn native_constraints(&self, audio: bool) -> ScreenConstraints {
        ScreenConstraints {
            audio,
            max_width: Some(self.screen_max_width),
            max_height: Some(self.screen_max_height),
            ideal_frame_rate: None,
            max_frame_rate: Some(self.native_max_frame_rate),
        }
    }

    pub fn camera_constraints(&self) -> CameraConstraints {
        CameraConstraints {
            ideal_width: self.camera_width,
            ideal_height: self.camera_height,
            ideal_frame_rate: self.camera_frame_rate,
            audio: true,
        }
    }
}

/// Compositor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositorSettings {
    /// Frame rate of the synthetic source
    pub output_frame_rate: u32,
    /// Display refresh rate driving the draw loop
    pub tick_rate_hz: u32,
    /// Surface size used when the screen does not report one
    pub fallback_width: u32,
    pub fallback_height: u32,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            output_frame_rate: 30,
            tick_rate_hz: 60,
            fallback_width: 1920,
            fallback_height: 1080,
        }
    }
}

impl CompositorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }
}

/// Encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingSettings {
    /// Candidate container/codec types, most preferred first
    pub mime_types: Vec<String>,
    /// How often the encoder emits a segment
    pub timeslice_ms: u64,
    pub ffmpeg_path: String,
    pub crf: u8,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            mime_types: vec![
                "video/webm;codecs=vp9".to_string(),
                "video/webm;codecs=vp8".to_string(),
                "video/webm".to_string(),
            ],
            timeslice_ms: 1000,
            ffmpeg_path: "ffmpeg".to_string(),
            crf: 32,
        }
    }
}

impl RecordingSettings {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }
}

/// Where finished recordings go when no save dialog is available
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputSettings {
    pub download_dir: Option<PathBuf>,
}

impl OutputSettings {
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .or_else(dirs::document_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl RecorderSettings {
    /// Default location: `<config dir>/screencam/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("screencam").join(SETTINGS_FILE))
    }

    /// Read settings from a JSON file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&content)?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Read settings, falling back to defaults when the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::debug!("No settings at {:?}, using defaults", path);
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Write settings as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.compositor.output_frame_rate == 0 {
            return Err(AppError::Config("compositor.outputFrameRate must be positive".to_string()));
        }
        if self.recording.mime_types.is_empty() {
            return Err(AppError::Config("recording.mimeTypes must not be empty".to_string()));
        }
        if self.compositor.fallback_width == 0 || self.compositor.fallback_height == 0 {
            return Err(AppError::Config("compositor fallback size must be non-zero".to_string()));
        }
        Ok(())
    }
}
