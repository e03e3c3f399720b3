//! Composition of a screen and a camera source into a synthetic source

use super::layout::{overlay_layout, OverlayLayout};
use super::surface::{Surface, WHITE};
use super::CompositeError;
use crate::capture::{MediaSource, SourceKind, TrackSettings, VideoTrack};
use crate::config::CompositorSettings;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Builds compositions from live inputs
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    settings: CompositorSettings,
}

impl Compositor {
    pub fn new(settings: CompositorSettings) -> Self {
        Self { settings }
    }

    /// Combine the screen and camera into one synthetic source.
    ///
    /// Fails with `NotReady` unless both inputs are present, live and carry
    /// video. One frame is drawn right away so the synthetic source has
    /// content before the draw loop is armed.
    pub fn combine(
        &self,
        screen: Option<&MediaSource>,
        camera: Option<&MediaSource>,
    ) -> Result<Composition, CompositeError> {
        let (Some(screen), Some(camera)) = (screen, camera) else {
            return Err(CompositeError::NotReady(
                "screen and camera must both be captured".to_string(),
            ));
        };
        if !screen.is_live() || !camera.is_live() {
            return Err(CompositeError::NotReady(
                "screen and camera must both be live".to_string(),
            ));
        }

        let screen_settings = screen
            .primary_video()
            .map(VideoTrack::settings)
            .unwrap_or_default();
        let width = screen_settings
            .width
            .filter(|w| *w > 0)
            .unwrap_or(self.settings.fallback_width);
        let height = screen_settings
            .height
            .filter(|h| *h > 0)
            .unwrap_or(self.settings.fallback_height);

        let output = VideoTrack::new(
            "composite",
            TrackSettings {
                width: Some(width),
                height: Some(height),
                frame_rate: Some(self.settings.output_frame_rate as f64),
            },
        );
        // Screen audio passes straight through; camera audio is not mixed in
        let synthetic = MediaSource::new(
            SourceKind::Synthetic,
            vec![output.clone()],
            screen.audio_tracks().to_vec(),
        );

        let composition = Composition {
            inner: Arc::new(CompositionInner {
                screen: screen.clone(),
                camera: camera.clone(),
                synthetic,
                output,
                surface: Mutex::new(Surface::new(width, height)),
                layout: overlay_layout(width, height),
                tick: self.settings.tick_interval(),
                draw_loop: Mutex::new(None),
            }),
        };
        composition.render_frame();

        tracing::info!(
            "Combined screen {} and camera {} into {} ({}x{})",
            screen.id(),
            camera.id(),
            composition.synthetic().id(),
            width,
            height
        );
        Ok(composition)
    }
}

struct CompositionInner {
    screen: MediaSource,
    camera: MediaSource,
    synthetic: MediaSource,
    output: VideoTrack,
    surface: Mutex<Surface>,
    layout: OverlayLayout,
    tick: Duration,
    draw_loop: Mutex<Option<JoinHandle<()>>>,
}

/// A live composite: the drawing surface and the synthetic source exposing it
#[derive(Clone)]
pub struct Composition {
    inner: Arc<CompositionInner>,
}

impl Composition {
    /// The synthetic source (composite video plus screen audio)
    pub fn synthetic(&self) -> &MediaSource {
        &self.inner.synthetic
    }

    pub fn layout(&self) -> OverlayLayout {
        self.inner.layout
    }

    pub fn size(&self) -> (u32, u32) {
        let surface = self.inner.surface.lock();
        (surface.width(), surface.height())
    }

    /// Draw one composite frame and publish it on the synthetic track
    pub fn render_frame(&self) -> bool {
        let frame = {
            let mut surface = self.inner.surface.lock();
            let full = super::Rect::new(0, 0, surface.width(), surface.height());
            surface.clear(super::surface::BLACK);

            if let Some(screen) = self.inner.screen.primary_video().and_then(|t| t.current_frame()) {
                surface.draw_frame(&screen, full);
            }

            // Border first, in the band around the overlay, then the camera inside it
            let layout = self.inner.layout;
            surface.fill_frame_band(layout.border, layout.camera, WHITE);
            if let Some(camera) = self.inner.camera.primary_video().and_then(|t| t.current_frame()) {
                surface.draw_frame(&camera, layout.camera);
            }

            surface.snapshot()
        };
        self.inner.output.push_frame(frame)
    }

    /// Redraw once per display tick while `active` holds.
    ///
    /// The loop checks the predicate before every draw and exits on the first
    /// tick where it is false; the synthetic source then keeps its last frame.
    pub fn run_while(&self, active: Arc<AtomicBool>) {
        let this = self.clone();
        let tick = self.inner.tick;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut frames = 0u64;

            loop {
                ticker.tick().await;
                if !active.load(Ordering::Acquire) || !this.inner.output.is_live() {
                    break;
                }
                this.render_frame();
                frames += 1;
            }
            tracing::debug!("Draw loop exited after {} frames", frames);
        });

        if let Some(previous) = self.inner.draw_loop.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Whether a draw loop is still scheduled
    pub fn is_drawing(&self) -> bool {
        self.inner
            .draw_loop
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the synthetic video track and cancel the draw loop.
    ///
    /// The passthrough audio tracks belong to the screen source and stay
    /// untouched.
    pub fn stop(&self) -> bool {
        if let Some(handle) = self.inner.draw_loop.lock().take() {
            handle.abort();
        }
        let stopped = self.inner.output.stop();
        if stopped {
            tracing::info!("Stopped synthetic source {}", self.inner.synthetic.id());
        }
        stopped
    }

    pub fn is_live(&self) -> bool {
        self.inner.output.is_live()
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("synthetic", &self.inner.synthetic.id())
            .field("layout", &self.inner.layout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AudioTrack, VideoFrame};

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];

    fn live_source(kind: SourceKind, width: u32, height: u32, color: [u8; 4], audio: usize) -> MediaSource {
        let video = VideoTrack::new(
            kind.to_string(),
            TrackSettings {
                width: Some(width),
                height: Some(height),
                frame_rate: Some(30.0),
            },
        );
        video.push_frame(VideoFrame::solid(width, height, color));
        let audio = (0..audio).map(|i| AudioTrack::new(format!("audio {}", i), None)).collect();
        MediaSource::new(kind, vec![video], audio)
    }

    #[test]
    fn test_combine_requires_both_sources() {
        let compositor = Compositor::default();
        let screen = live_source(SourceKind::Screen, 64, 48, RED, 0);

        let err = compositor.combine(Some(&screen), None).unwrap_err();
        assert_eq!(err.kind(), crate::utils::error::ErrorKind::NotReady);
        assert!(compositor.combine(None, Some(&screen)).is_err());
        assert!(compositor.combine(None, None).is_err());
    }

    #[test]
    fn test_combine_rejects_ended_source() {
        let compositor = Compositor::default();
        let screen = live_source(SourceKind::Screen, 64, 48, RED, 0);
        let camera = live_source(SourceKind::Camera, 32, 24, GREEN, 0);
        camera.stop();

        assert!(compositor.combine(Some(&screen), Some(&camera)).is_err());
    }

    #[test]
    fn test_combine_draws_preview_frame() {
        let compositor = Compositor::default();
        let screen = live_source(SourceKind::Screen, 1920, 1080, RED, 1);
        let camera = live_source(SourceKind::Camera, 640, 480, GREEN, 1);

        let composition = compositor.combine(Some(&screen), Some(&camera)).unwrap();
        let synthetic = composition.synthetic();
        assert_eq!(synthetic.kind(), SourceKind::Synthetic);
        assert_eq!(synthetic.video_tracks().len(), 1);
        assert_eq!(synthetic.audio_tracks().len(), 1);
        assert_eq!(synthetic.audio_tracks()[0].id(), screen.audio_tracks()[0].id());

        let settings = synthetic.video_tracks()[0].settings();
        assert_eq!(settings.frame_rate, Some(30.0));

        let frame = synthetic.video_tracks()[0].current_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (1920, 1080));
        // Screen background, border band, camera overlay
        assert_eq!(frame.pixel(10, 10), Some(RED));
        assert_eq!(frame.pixel(1698, 900), Some(WHITE));
        assert_eq!(frame.pixel(1800, 960), Some(GREEN));
        assert_eq!(frame.pixel(1910, 1070), Some(RED));
    }

    #[test]
    fn test_surface_falls_back_without_screen_size() {
        let compositor = Compositor::default();
        let screen = MediaSource::new(
            SourceKind::Screen,
            vec![VideoTrack::new("screen", TrackSettings::default())],
            vec![],
        );
        let camera = live_source(SourceKind::Camera, 64, 48, GREEN, 0);

        let composition = compositor.combine(Some(&screen), Some(&camera)).unwrap();
        assert_eq!(composition.size(), (1920, 1080));
    }

    #[test]
    fn test_stop_keeps_screen_audio() {
        let compositor = Compositor::default();
        let screen = live_source(SourceKind::Screen, 64, 48, RED, 1);
        let camera = live_source(SourceKind::Camera, 32, 24, GREEN, 0);
        let composition = compositor.combine(Some(&screen), Some(&camera)).unwrap();

        assert!(composition.stop());
        assert!(!composition.stop());
        assert!(!composition.synthetic().is_live());
        assert!(screen.audio_tracks()[0].is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn test_draw_loop_follows_predicate() {
        let compositor = Compositor::default();
        let screen = live_source(SourceKind::Screen, 64, 48, RED, 0);
        let camera = live_source(SourceKind::Camera, 32, 24, GREEN, 0);
        let composition = compositor.combine(Some(&screen), Some(&camera)).unwrap();

        let active = Arc::new(AtomicBool::new(true));
        composition.run_while(active.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(composition.is_drawing());

        // New screen content shows up on the next tick
        screen.video_tracks()[0].push_frame(VideoFrame::solid(64, 48, GREEN));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let frame = composition.synthetic().video_tracks()[0].current_frame().unwrap();
        assert_eq!(frame.pixel(0, 0), Some(GREEN));

        active.store(false, Ordering::Release);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!composition.is_drawing());

        // Frozen: later screen frames are not drawn
        screen.video_tracks()[0].push_frame(VideoFrame::solid(64, 48, RED));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let frame = composition.synthetic().video_tracks()[0].current_frame().unwrap();
        assert_eq!(frame.pixel(0, 0), Some(GREEN));
    }
}
