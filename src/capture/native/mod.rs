//! Platform capture backends
//!
//! Screen capture polls display images on a capture thread (CoreGraphics on
//! macOS, GDI on Windows). The camera goes through nokhwa and the
//! microphone through cpal. Desktop audio is not available natively.

pub mod camera;
pub mod microphone;
pub mod screen;

#[cfg(target_os = "macos")]
mod screen_macos;
#[cfg(target_os = "windows")]
mod screen_windows;

use super::source::MediaSource;
use super::traits::{
    CameraConstraints, CaptureError, CaptureResult, DesktopSource, DesktopSourceType,
    ScreenConstraints, SourceProvider,
};
use async_trait::async_trait;

/// `SourceProvider` backed by the host's devices
#[derive(Debug, Clone, Default)]
pub struct NativeSourceProvider;

impl NativeSourceProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceProvider for NativeSourceProvider {
    fn supports_desktop_sources(&self) -> bool {
        screen::is_supported()
    }

    fn supports_display_media(&self) -> bool {
        screen::is_supported()
    }

    async fn desktop_sources(&self, types: &[DesktopSourceType]) -> CaptureResult<Vec<DesktopSource>> {
        if !types.contains(&DesktopSourceType::Screen) {
            return Ok(Vec::new());
        }
        screen::ensure_permission()?;
        Ok(screen::list_displays().iter().map(DesktopSource::from).collect())
    }

    async fn capture_desktop_source(
        &self,
        source: &DesktopSource,
        constraints: &ScreenConstraints,
    ) -> CaptureResult<MediaSource> {
        if constraints.audio {
            return Err(CaptureError::Unsupported(
                "Desktop audio capture is not available".to_string(),
            ));
        }
        let display = screen::find_display(&source.id)?;
        screen::capture_display(display, constraints).await
    }

    async fn display_media(&self, constraints: &ScreenConstraints) -> CaptureResult<MediaSource> {
        if constraints.audio {
            return Err(CaptureError::Unsupported(
                "Desktop audio capture is not available".to_string(),
            ));
        }
        screen::ensure_permission()?;
        let display = screen::list_displays()
            .into_iter()
            .max_by_key(|d| d.is_primary)
            .ok_or_else(|| CaptureError::NoSourceFound("No displays found".to_string()))?;
        screen::capture_display(display, constraints).await
    }

    async fn user_media(&self, constraints: &CameraConstraints) -> CaptureResult<MediaSource> {
        let video = camera::open_camera(constraints).await?;

        let audio = if constraints.audio {
            match microphone::open_default_microphone().await {
                Ok(track) => vec![track],
                Err(e) => {
                    video.stop();
                    return Err(e);
                }
            }
        } else {
            Vec::new()
        };

        Ok(MediaSource::new(super::SourceKind::Camera, vec![video], audio))
    }
}
