//! Screen and camera acquisition
//!
//! Wraps a `SourceProvider` with the selection and fallback rules: native
//! enumeration first, then the generic display request, then a video-only
//! retry. Acquired sources get a termination observer that reports
//! host-initiated ends back to the session.

use super::source::{EndReason, MediaSource, SourceKind};
use super::traits::{
    CaptureError, CaptureResult, DesktopSource, DesktopSourceType, Platform, ScreenConstraints,
    SourceProvider,
};
use crate::config::CaptureSettings;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Name fragments that identify the whole primary screen
const PREFERRED_SOURCE_NAMES: [&str; 3] = ["entire screen", "screen 1", "primary"];

/// Sent when the host ends a source the session still holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationNotice {
    pub kind: SourceKind,
    pub source_id: Uuid,
}

/// Pick the desktop source to capture: the primary/entire screen if one is
/// named that way, else the first entry.
pub fn select_preferred_source(sources: &[DesktopSource]) -> Option<&DesktopSource> {
    sources
        .iter()
        .find(|source| {
            let name = source.name.to_lowercase();
            PREFERRED_SOURCE_NAMES.iter().any(|pattern| name.contains(pattern))
        })
        .or_else(|| sources.first())
}

/// Obtains screen and camera sources from the host
pub struct SourceAcquirer {
    provider: Arc<dyn SourceProvider>,
    settings: CaptureSettings,
    notices: mpsc::UnboundedSender<TerminationNotice>,
}

impl SourceAcquirer {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        settings: CaptureSettings,
        notices: mpsc::UnboundedSender<TerminationNotice>,
    ) -> Self {
        Self {
            provider,
            settings,
            notices,
        }
    }

    /// Acquire the screen
    pub async fn acquire_screen(&self) -> CaptureResult<MediaSource> {
        if self.provider.supports_desktop_sources() {
            match self.native_screen().await {
                Ok(source) => {
                    self.observe(&source);
                    return Ok(source);
                }
                Err(e) => {
                    tracing::warn!("Native screen capture failed, falling back to display request: {}", e);
                }
            }
        }

        if !self.provider.supports_display_media() {
            return Err(CaptureError::Unsupported(
                "Screen sharing is not supported in this environment".to_string(),
            ));
        }

        let constraints = self.settings.display_constraints();
        let source = match self.provider.display_media(&constraints).await {
            Ok(source) => source,
            Err(first) if constraints.audio => {
                tracing::warn!("Display request with audio failed, retrying video-only: {}", first);
                self.provider
                    .display_media(&ScreenConstraints::video_only())
                    .await?
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            "Screen source {} acquired ({} video, {} audio tracks)",
            source.id(),
            source.video_tracks().len(),
            source.audio_tracks().len()
        );
        self.observe(&source);
        Ok(source)
    }

    /// Platform-native path: enumerate, pick, capture by id
    async fn native_screen(&self) -> CaptureResult<MediaSource> {
        let sources = self
            .provider
            .desktop_sources(&[DesktopSourceType::Screen])
            .await?;
        let preferred = select_preferred_source(&sources)
            .ok_or_else(|| CaptureError::NoSourceFound("No screen sources available".to_string()))?;

        // Desktop audio through native capture is not available on macOS
        let want_audio = self.settings.request_screen_audio && self.provider.platform() != Platform::Macos;
        tracing::info!("Capturing desktop source '{}' (audio: {})", preferred.name, want_audio);

        self.provider
            .capture_desktop_source(preferred, &self.settings.native_constraints(want_audio))
            .await
    }

    /// Acquire the camera with its microphone. No retry.
    pub async fn acquire_camera(&self) -> CaptureResult<MediaSource> {
        let source = self
            .provider
            .user_media(&self.settings.camera_constraints())
            .await?;
        tracing::info!("Camera source {} acquired", source.id());
        self.observe(&source);
        Ok(source)
    }

    /// Report a host-initiated end of the source's primary video track
    fn observe(&self, source: &MediaSource) {
        let Some(track) = source.primary_video() else {
            return;
        };

        let ended = track.ended();
        let notice = TerminationNotice {
            kind: source.kind(),
            source_id: source.id(),
        };
        let notices = self.notices.clone();
        let source = source.clone();

        tokio::spawn(async move {
            if ended.await == EndReason::HostEnded {
                tracing::info!("Host ended {} source {}", notice.kind, notice.source_id);
                // Release whatever else the source still holds
                source.stop();
                let _ = notices.send(notice);
            }
        });
    }
}
