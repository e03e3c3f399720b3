//! End-to-end session flows against fake capture, encoder and storage

use async_trait::async_trait;
use parking_lot::Mutex as ParkingMutex;
use screencam_lib::capture::{
    AudioFormat, AudioTrack, CameraConstraints, CaptureError, CaptureResult, DesktopSource,
    DesktopSourceType, MediaSource, ScreenConstraints, SourceKind, SourceProvider,
    TerminationNotice, TrackSettings, VideoFrame, VideoTrack,
};
use screencam_lib::config::RecorderSettings;
use screencam_lib::persistence::{
    PersistenceError, PersistenceGateway, PersistenceSink, SaveMethod, SaveRequest,
};
use screencam_lib::recorder::{
    Encoder, EncoderEvent, EncoderFactory, EncoderOptions, EncoderSink, RecordingResult,
};
use screencam_lib::session::{run_termination_loop, SessionController, StatusLevel};
use screencam_lib::utils::error::{AppError, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];

fn video_track(label: &str, width: u32, height: u32, color: [u8; 4]) -> VideoTrack {
    let track = VideoTrack::new(
        label,
        TrackSettings {
            width: Some(width),
            height: Some(height),
            frame_rate: Some(30.0),
        },
    );
    track.push_frame(VideoFrame::solid(width, height, color));
    track
}

fn audio_track(label: &str) -> AudioTrack {
    AudioTrack::new(
        label,
        Some(AudioFormat {
            sample_rate: 48000,
            channels: 2,
        }),
    )
}

/// Display-request-only host with a 1920x1080 screen and a 640x480 camera
#[derive(Default)]
struct FakeProvider {
    screen_audio_unsupported: bool,
    camera_error: Option<CaptureError>,
    /// Screen requests granted before the user starts declining
    screen_grants: Option<usize>,
    display_requests: ParkingMutex<Vec<bool>>,
}

#[async_trait]
impl SourceProvider for FakeProvider {
    fn supports_desktop_sources(&self) -> bool {
        false
    }

    fn supports_display_media(&self) -> bool {
        true
    }

    async fn desktop_sources(&self, _types: &[DesktopSourceType]) -> CaptureResult<Vec<DesktopSource>> {
        Ok(Vec::new())
    }

    async fn capture_desktop_source(
        &self,
        _source: &DesktopSource,
        _constraints: &ScreenConstraints,
    ) -> CaptureResult<MediaSource> {
        Err(CaptureError::Unsupported("no desktop sources".to_string()))
    }

    async fn display_media(&self, constraints: &ScreenConstraints) -> CaptureResult<MediaSource> {
        let requests = {
            let mut requests = self.display_requests.lock();
            requests.push(constraints.audio);
            requests.len()
        };
        if self.screen_grants.is_some_and(|grants| requests > grants) {
            return Err(CaptureError::PermissionDenied("share declined".to_string()));
        }
        if constraints.audio && self.screen_audio_unsupported {
            return Err(CaptureError::Unsupported("desktop audio".to_string()));
        }
        let audio = if constraints.audio {
            vec![audio_track("System Audio")]
        } else {
            Vec::new()
        };
        Ok(MediaSource::new(
            SourceKind::Screen,
            vec![video_track("Entire screen", 1920, 1080, RED)],
            audio,
        ))
    }

    async fn user_media(&self, constraints: &CameraConstraints) -> CaptureResult<MediaSource> {
        if let Some(e) = &self.camera_error {
            return Err(e.clone());
        }
        Ok(MediaSource::new(
            SourceKind::Camera,
            vec![video_track(
                "FaceTime HD Camera",
                constraints.ideal_width,
                constraints.ideal_height,
                GREEN,
            )],
            vec![audio_track("Default Microphone")],
        ))
    }
}

/// Emits one numbered segment per timeslice, plus a tail on stop
struct TickingEncoder {
    sink: EncoderSink,
    timeslice: Duration,
    counter: Arc<AtomicUsize>,
    ticker: Option<JoinHandle<()>>,
}

#[async_trait]
impl Encoder for TickingEncoder {
    fn mime_type(&self) -> &str {
        "video/webm;codecs=vp9"
    }

    async fn start(&mut self) -> RecordingResult<()> {
        let sink = self.sink.clone();
        let timeslice = self.timeslice;
        let counter = self.counter.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
            loop {
                ticker.tick().await;
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let _ = sink.send(EncoderEvent::DataAvailable(vec![n as u8; 16]));
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let _ = self.sink.send(EncoderEvent::DataAvailable(vec![n as u8; 16]));
        let _ = self.sink.send(EncoderEvent::Stopped);
        Ok(())
    }
}

struct TickingFactory;

impl EncoderFactory for TickingFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type.starts_with("video/webm")
    }

    fn create(
        &self,
        _source: &MediaSource,
        options: &EncoderOptions,
        sink: EncoderSink,
    ) -> RecordingResult<Box<dyn Encoder>> {
        Ok(Box::new(TickingEncoder {
            sink,
            timeslice: options.timeslice,
            counter: Arc::new(AtomicUsize::new(0)),
            ticker: None,
        }))
    }
}

/// Keeps every saved file in memory
#[derive(Default)]
struct MemorySink {
    saved: ParkingMutex<Vec<(String, usize)>>,
}

#[async_trait]
impl PersistenceSink for MemorySink {
    fn method(&self) -> SaveMethod {
        SaveMethod::Download
    }

    async fn save(&self, request: &SaveRequest, bytes: Arc<[u8]>) -> Result<PathBuf, PersistenceError> {
        self.saved.lock().push((request.file_name.clone(), bytes.len()));
        Ok(PathBuf::from("/downloads").join(&request.file_name))
    }
}

struct Harness {
    session: SessionController,
    notices: tokio::sync::mpsc::UnboundedReceiver<TerminationNotice>,
    sink: Arc<MemorySink>,
}

fn harness(provider: FakeProvider) -> Harness {
    screencam_lib::init_tracing();
    let sink = Arc::new(MemorySink::default());
    let (session, notices) = SessionController::new(
        &RecorderSettings::default(),
        Arc::new(provider),
        Arc::new(TickingFactory),
        PersistenceGateway::new(sink.clone()),
    );
    Harness {
        session,
        notices,
        sink,
    }
}

fn is_default_file_name(name: &str) -> bool {
    name.strip_prefix("recording-")
        .and_then(|rest| rest.strip_suffix(".webm"))
        .map(|millis| !millis.is_empty() && millis.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

async fn ready_to_record(session: &mut SessionController) {
    session.start_screen_capture().await.unwrap();
    session.start_camera_capture().await.unwrap();
    session.combine_streams().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_record_and_download() {
    let Harness { mut session, sink, .. } = harness(FakeProvider::default());
    let mut statuses = session.subscribe();

    ready_to_record(&mut session).await;
    let started = session.start_recording().await.unwrap();
    assert_eq!(started.message, "Recording started");
    assert_eq!(started.level, StatusLevel::Success);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(session.snapshot().elapsed_label, "00:03");

    let done = session.stop_recording().await.unwrap();
    assert_eq!(done.message, "Video downloaded successfully");
    assert!(!session.is_recording());

    let saved = sink.saved.lock().clone();
    assert_eq!(saved.len(), 1);
    assert!(is_default_file_name(&saved[0].0), "unexpected name {}", saved[0].0);
    // Three timed segments plus the tail
    assert!(saved[0].1 >= 3 * 16);

    let last_save = session.last_save().unwrap();
    assert!(last_save.success);
    assert_eq!(last_save.method, SaveMethod::Download);

    let mut messages = Vec::new();
    while let Ok(status) = statuses.try_recv() {
        messages.push(status.message);
    }
    let tail: Vec<&str> = messages.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(tail, ["Recording stopped", "Saving video...", "Video downloaded successfully"]);
    assert_eq!(messages[0], "Requesting screen access...");

    // Sources stay up after a recording
    assert!(session.state().screen_live());
    assert!(session.state().camera_live());
}

#[tokio::test(start_paused = true)]
async fn test_screen_audio_falls_back_to_video_only() {
    let Harness { mut session, .. } = harness(FakeProvider {
        screen_audio_unsupported: true,
        ..Default::default()
    });

    let status = session.start_screen_capture().await.unwrap();
    assert_eq!(status.message, "Screen capture started");

    let screen = session.state().screen.clone().unwrap();
    assert_eq!(screen.video_tracks().len(), 1);
    assert!(screen.audio_tracks().is_empty());

    session.start_camera_capture().await.unwrap();
    session.combine_streams().unwrap();
    let synthetic = session.state().composition.as_ref().unwrap().synthetic().clone();
    assert!(synthetic.audio_tracks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_composite_carries_screen_audio_only() {
    let Harness { mut session, .. } = harness(FakeProvider::default());
    ready_to_record(&mut session).await;

    let composition = session.state().composition.clone().unwrap();
    let synthetic = composition.synthetic();
    assert_eq!(synthetic.kind(), SourceKind::Synthetic);
    assert_eq!(synthetic.video_tracks().len(), 1);
    assert_eq!(synthetic.audio_tracks().len(), 1);
    assert_eq!(synthetic.audio_tracks()[0].label(), "System Audio");
    assert_eq!(composition.size(), (1920, 1080));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_actions() {
    let Harness { mut session, .. } = harness(FakeProvider::default());

    let err = session.combine_streams().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
    assert_eq!(
        session.last_status().unwrap().message,
        "Please start both screen and camera capture first"
    );

    let err = session.start_recording().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotCombined);
    assert_eq!(session.last_status().unwrap().message, "Please combine streams first");

    let err = session.stop_recording().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotRecording);
    assert!(session.last_status().unwrap().is_error());

    session.start_screen_capture().await.unwrap();
    assert!(session.combine_streams().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_start_while_recording_keeps_running() {
    let Harness { mut session, sink, .. } = harness(FakeProvider::default());
    ready_to_record(&mut session).await;
    session.start_recording().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let err = session.start_recording().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRecording);
    assert!(session.is_recording());
    assert_eq!(session.snapshot().elapsed_secs, 2);

    let err = session.combine_streams().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRecording);
    assert!(session.state().combined());

    session.stop_recording().await.unwrap();
    assert_eq!(sink.saved.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_is_idempotent() {
    let Harness { mut session, sink, .. } = harness(FakeProvider::default());

    assert_eq!(session.stop_all().await.message, "All streams stopped");
    assert!(session.state().is_empty());

    session.start_screen_capture().await.unwrap();
    let screen = session.state().screen.clone().unwrap();
    session.stop_all().await;
    assert!(!screen.is_live());
    assert!(session.state().is_empty());

    ready_to_record(&mut session).await;
    session.start_recording().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let status = session.stop_all().await;
    assert_eq!(status.message, "All streams stopped");
    assert!(!session.is_recording());
    assert!(session.state().is_empty());
    // The in-progress recording was saved first
    assert_eq!(sink.saved.lock().len(), 1);

    session.stop_all().await;
    assert!(session.state().is_empty());
    assert_eq!(sink.saved.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_camera_failure_reports_error() {
    let Harness { mut session, .. } = harness(FakeProvider {
        camera_error: Some(CaptureError::PermissionDenied("camera".to_string())),
        ..Default::default()
    });

    let err = session.start_camera_capture().await.unwrap_err();
    assert!(matches!(err, AppError::Capture(CaptureError::PermissionDenied(_))));
    let status = session.last_status().unwrap();
    assert!(status.is_error());
    assert!(status.message.starts_with("Error: "));
    assert!(session.state().camera.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reacquire_screen_replaces_source() {
    let Harness { mut session, .. } = harness(FakeProvider::default());
    ready_to_record(&mut session).await;
    let first = session.state().screen.clone().unwrap();

    session.start_screen_capture().await.unwrap();
    let second = session.state().screen.clone().unwrap();

    assert_ne!(first.id(), second.id());
    assert!(!first.is_live());
    assert!(second.is_live());
    // The old composite depended on the released screen
    assert!(session.state().composition.is_none());
    assert!(session.state().camera_live());
}

#[tokio::test(start_paused = true)]
async fn test_host_ended_screen_cascades() {
    let Harness {
        session,
        notices,
        sink,
    } = harness(FakeProvider::default());
    let session = Arc::new(tokio::sync::Mutex::new(session));
    tokio::spawn(run_termination_loop(session.clone(), notices));

    {
        let mut guard = session.lock().await;
        ready_to_record(&mut guard).await;
        guard.start_recording().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let screen = session.lock().await.state().screen.clone().unwrap();
    screen.primary_video().unwrap().end_by_host();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let guard = session.lock().await;
    assert!(!guard.is_recording());
    assert!(guard.state().screen.is_none());
    assert!(guard.state().composition.is_none());
    assert!(guard.state().camera_live());
    assert_eq!(guard.last_status().unwrap().message, "Screen capture ended");
    assert_eq!(sink.saved.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reacquire_keeps_live_screen() {
    let Harness { mut session, .. } = harness(FakeProvider {
        screen_grants: Some(1),
        ..Default::default()
    });
    ready_to_record(&mut session).await;
    let first = session.state().screen.clone().unwrap();

    let err = session.start_screen_capture().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(first.is_live());
    assert_eq!(session.state().screen.as_ref().map(|s| s.id()), Some(first.id()));
    assert!(session.state().combined());
}

#[tokio::test(start_paused = true)]
async fn test_host_ended_camera_cascades() {
    let Harness {
        session,
        notices,
        sink,
    } = harness(FakeProvider::default());
    let session = Arc::new(tokio::sync::Mutex::new(session));
    tokio::spawn(run_termination_loop(session.clone(), notices));

    {
        let mut guard = session.lock().await;
        ready_to_record(&mut guard).await;
        guard.start_recording().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let camera = session.lock().await.state().camera.clone().unwrap();
    camera.primary_video().unwrap().end_by_host();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let guard = session.lock().await;
    assert!(!camera.is_live());
    assert!(!guard.is_recording());
    assert!(guard.state().camera.is_none());
    assert!(guard.state().composition.is_none());
    assert!(guard.state().screen_live());
    assert_eq!(guard.last_status().unwrap().message, "Camera capture ended");
    assert_eq!(sink.saved.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_combines_sources_and_recorder() {
    let Harness { mut session, .. } = harness(FakeProvider::default());
    let idle = session.snapshot();
    assert!(!idle.screen_live && !idle.camera_live && !idle.combined && !idle.recording);
    assert_eq!(idle.mime_type, None);

    ready_to_record(&mut session).await;
    session.start_recording().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let snapshot = session.snapshot();
    assert!(snapshot.screen_live && snapshot.camera_live && snapshot.combined);
    assert!(snapshot.recording);
    assert_eq!(snapshot.elapsed_secs, 1);
    assert_eq!(snapshot.mime_type.as_deref(), Some("video/webm;codecs=vp9"));
    assert_eq!(snapshot.status, session.last_status().cloned());
}

#[tokio::test(start_paused = true)]
async fn test_stale_end_notice_is_ignored() {
    let Harness { mut session, .. } = harness(FakeProvider::default());
    ready_to_record(&mut session).await;

    let stale = TerminationNotice {
        kind: SourceKind::Screen,
        source_id: Uuid::new_v4(),
    };
    assert!(session.handle_source_ended(stale).await.is_none());
    assert!(session.state().screen_live());
    assert!(session.state().combined());
}
