//! Live media sources and their tracks
//!
//! A `MediaSource` bundles the video and audio tracks produced by one
//! acquisition (screen, camera) or by the compositor (synthetic). Tracks are
//! cheap to clone handles; every clone observes the same lifecycle.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Where a source's content comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Screen,
    Camera,
    Synthetic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Screen => write!(f, "screen"),
            SourceKind::Camera => write!(f, "camera"),
            SourceKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Why a track stopped producing media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The owner stopped the track
    Stopped,
    /// The host ended it (share revoked, device unplugged)
    HostEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Live,
    Ended(EndReason),
}

/// Reported capture settings of a video track
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
}

/// A single RGBA8 video frame. `data` always holds `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl VideoFrame {
    /// Wrap RGBA pixel data. Returns `None` if the buffer size does not match.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self { width, height, data })
    }

    /// Wrap a buffer already known to be `width * height * 4` bytes
    pub(crate) fn from_rgba_unchecked(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, row-major without padding
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// A frame filled with one color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self { width, height, data }
    }

    /// Convert a BGRA buffer (possibly row-padded) into an RGBA frame
    pub fn from_bgra(width: u32, height: u32, bytes_per_row: usize, bgra: &[u8]) -> Option<Self> {
        let row_len = width as usize * 4;
        if bytes_per_row < row_len || bgra.len() < bytes_per_row * height as usize {
            return None;
        }

        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in bgra.chunks(bytes_per_row).take(height as usize) {
            for px in row[..row_len].chunks_exact(4) {
                data.extend_from_slice(&[px[2], px[1], px[0], 255]);
            }
        }
        Some(Self { width, height, data })
    }

    /// Read one pixel; `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        Some([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }
}

/// Sample layout of an audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A block of interleaved f32 samples
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub format: AudioFormat,
    pub samples: Vec<f32>,
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Lifecycle shared by audio and video tracks
struct TrackCore {
    id: Uuid,
    label: String,
    state: watch::Sender<TrackState>,
    release: Mutex<Option<ReleaseHook>>,
}

impl TrackCore {
    fn new(label: String) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            id: Uuid::new_v4(),
            label,
            state,
            release: Mutex::new(None),
        }
    }

    fn is_live(&self) -> bool {
        *self.state.borrow() == TrackState::Live
    }

    fn end_reason(&self) -> Option<EndReason> {
        match *self.state.borrow() {
            TrackState::Live => None,
            TrackState::Ended(reason) => Some(reason),
        }
    }

    /// Move to `Ended`. Only the first call wins and runs the release hook.
    fn finish(&self, reason: EndReason) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended(reason);
                true
            } else {
                false
            }
        });

        if changed {
            if let Some(release) = self.release.lock().take() {
                release();
            }
            tracing::debug!("Track '{}' ({}) ended: {:?}", self.label, self.id, reason);
        }
        changed
    }

    fn set_release(&self, hook: ReleaseHook) {
        if self.is_live() {
            *self.release.lock() = Some(hook);
        } else {
            hook();
        }
    }

    fn ended(&self) -> impl Future<Output = EndReason> + Send + 'static {
        let mut rx = self.state.subscribe();
        async move {
            loop {
                let state = *rx.borrow_and_update();
                if let TrackState::Ended(reason) = state {
                    return reason;
                }
                if rx.changed().await.is_err() {
                    return EndReason::Stopped;
                }
            }
        }
    }
}

/// A live video track holding the most recent frame
#[derive(Clone)]
pub struct VideoTrack {
    core: Arc<TrackCore>,
    settings: Arc<Mutex<TrackSettings>>,
    latest: Arc<Mutex<Option<Arc<VideoFrame>>>>,
}

impl VideoTrack {
    pub fn new(label: impl Into<String>, settings: TrackSettings) -> Self {
        Self {
            core: Arc::new(TrackCore::new(label.into())),
            settings: Arc::new(Mutex::new(settings)),
            latest: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn label(&self) -> &str {
        &self.core.label
    }

    pub fn settings(&self) -> TrackSettings {
        *self.settings.lock()
    }

    /// Publish a new frame. Frames pushed after the track ended are dropped.
    pub fn push_frame(&self, frame: VideoFrame) -> bool {
        if !self.core.is_live() {
            return false;
        }
        {
            let mut settings = self.settings.lock();
            settings.width = Some(frame.width);
            settings.height = Some(frame.height);
        }
        *self.latest.lock() = Some(Arc::new(frame));
        true
    }

    /// The frame currently on display, if any has arrived
    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.latest.lock().clone()
    }

    pub fn is_live(&self) -> bool {
        self.core.is_live()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.core.end_reason()
    }

    /// Stop the track and release its device. Returns false if already ended.
    pub fn stop(&self) -> bool {
        self.core.finish(EndReason::Stopped)
    }

    /// Report that the host ended the track
    pub fn end_by_host(&self) -> bool {
        self.core.finish(EndReason::HostEnded)
    }

    /// Register the closure that releases the underlying device
    pub fn on_release(&self, hook: impl FnOnce() + Send + 'static) {
        self.core.set_release(Box::new(hook));
    }

    /// Resolves once the track has ended
    pub fn ended(&self) -> impl Future<Output = EndReason> + Send + 'static {
        self.core.ended()
    }
}

impl fmt::Debug for VideoTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoTrack")
            .field("id", &self.core.id)
            .field("label", &self.core.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A live audio track fanning out sample chunks to subscribers
#[derive(Clone)]
pub struct AudioTrack {
    core: Arc<TrackCore>,
    format: Arc<Mutex<Option<AudioFormat>>>,
    samples: broadcast::Sender<Arc<AudioChunk>>,
}

impl AudioTrack {
    pub fn new(label: impl Into<String>, format: Option<AudioFormat>) -> Self {
        let (samples, _) = broadcast::channel(256);
        Self {
            core: Arc::new(TrackCore::new(label.into())),
            format: Arc::new(Mutex::new(format)),
            samples,
        }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn label(&self) -> &str {
        &self.core.label
    }

    pub fn format(&self) -> Option<AudioFormat> {
        *self.format.lock()
    }

    /// Publish a chunk to every subscriber
    pub fn push_samples(&self, chunk: AudioChunk) -> bool {
        if !self.core.is_live() {
            return false;
        }
        self.format.lock().get_or_insert(chunk.format);
        // No subscribers is fine, nobody is encoding yet
        let _ = self.samples.send(Arc::new(chunk));
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AudioChunk>> {
        self.samples.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.core.is_live()
    }

    pub fn stop(&self) -> bool {
        self.core.finish(EndReason::Stopped)
    }

    pub fn end_by_host(&self) -> bool {
        self.core.finish(EndReason::HostEnded)
    }

    pub fn on_release(&self, hook: impl FnOnce() + Send + 'static) {
        self.core.set_release(Box::new(hook));
    }

    pub fn ended(&self) -> impl Future<Output = EndReason> + Send + 'static {
        self.core.ended()
    }
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("id", &self.core.id)
            .field("label", &self.core.label)
            .field("live", &self.is_live())
            .finish()
    }
}

struct MediaSourceInner {
    id: Uuid,
    kind: SourceKind,
    video: Vec<VideoTrack>,
    audio: Vec<AudioTrack>,
}

/// A live capture handle: screen, camera, or the synthetic composite
#[derive(Clone)]
pub struct MediaSource {
    inner: Arc<MediaSourceInner>,
}

impl MediaSource {
    /// Every construction gets a fresh identity
    pub fn new(kind: SourceKind, video: Vec<VideoTrack>, audio: Vec<AudioTrack>) -> Self {
        Self {
            inner: Arc::new(MediaSourceInner {
                id: Uuid::new_v4(),
                kind,
                video,
                audio,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> SourceKind {
        self.inner.kind
    }

    pub fn video_tracks(&self) -> &[VideoTrack] {
        &self.inner.video
    }

    pub fn audio_tracks(&self) -> &[AudioTrack] {
        &self.inner.audio
    }

    /// The track termination is tracked on
    pub fn primary_video(&self) -> Option<&VideoTrack> {
        self.inner.video.first()
    }

    /// Live while its primary video track is live
    pub fn is_live(&self) -> bool {
        self.primary_video().map(VideoTrack::is_live).unwrap_or(false)
    }

    /// Stop every track. Tracks already ended are left alone.
    pub fn stop(&self) -> usize {
        let stopped = self.inner.video.iter().filter(|t| t.stop()).count()
            + self.inner.audio.iter().filter(|t| t.stop()).count();
        if stopped > 0 {
            tracing::info!("Stopped {} source {} ({} tracks)", self.inner.kind, self.inner.id, stopped);
        }
        stopped
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSource")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("video", &self.inner.video)
            .field("audio", &self.inner.audio)
            .finish()
    }
}
