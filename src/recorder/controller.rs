//! Recording controller
//!
//! Owns the Idle → Recording → Idle state machine: attaches an encoder to the
//! synthetic source, buffers its segments, ticks the elapsed counter, and
//! seals the segments into one blob on stop.

use super::encoder::{
    negotiate_mime_type, Encoder, EncoderEvent, EncoderFactory, EncoderOptions, RecordingError,
    RecordingResult,
};
use super::state::{RecordingBlob, RecordingState, SegmentBuffer};
use crate::capture::MediaSource;
use crate::config::RecordingSettings;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingEvent {
    /// Recording started with the negotiated mime type
    Started(String),
    /// Elapsed whole seconds
    Tick(u64),
    /// Recording stopped
    Stopped,
    /// Error reported by the encoder
    Error(String),
}

/// Drives one encoder at a time
pub struct RecordingController {
    factory: Arc<dyn EncoderFactory>,
    settings: RecordingSettings,

    /// Current recording state
    state: Arc<RwLock<RecordingState>>,

    /// Segments of the current (or last) recording
    buffer: Arc<Mutex<SegmentBuffer>>,

    /// Whole seconds since start; kept after stop for display
    elapsed: Arc<AtomicU64>,

    /// Continuation flag for anything tied to the record lifecycle
    active: Arc<AtomicBool>,

    encoder: Option<Box<dyn Encoder>>,
    mime_type: Option<String>,
    collector: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,

    /// Event broadcaster
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingController {
    pub fn new(factory: Arc<dyn EncoderFactory>, settings: RecordingSettings) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            factory,
            settings,
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            buffer: Arc::new(Mutex::new(SegmentBuffer::new())),
            elapsed: Arc::new(AtomicU64::new(0)),
            active: Arc::new(AtomicBool::new(false)),
            encoder: None,
            mime_type: None,
            collector: None,
            timer: None,
            event_tx,
        }
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Acquire)
    }

    /// Number of non-empty segments buffered so far
    pub fn segment_count(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Mime type of the running (or last) recording
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// True exactly while recording; the draw loop runs on this
    pub fn activity_flag(&self) -> Arc<AtomicBool> {
        self.active.clone()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Start recording the synthetic source.
    ///
    /// Rejected while already recording without touching the running
    /// recording. Encoder failures leave the controller idle.
    pub async fn start(&mut self, synthetic: Option<&MediaSource>) -> RecordingResult<()> {
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        let synthetic = synthetic
            .filter(|source| source.is_live())
            .ok_or(RecordingError::NotCombined)?;

        let mime_type =
            negotiate_mime_type(self.factory.as_ref(), &self.settings.mime_types)?.to_string();
        let options = EncoderOptions {
            mime_type: mime_type.clone(),
            timeslice: self.settings.timeslice(),
            crf: self.settings.crf,
        };

        let (sink, events) = mpsc::unbounded_channel();
        let mut encoder = self.factory.create(synthetic, &options, sink)?;

        self.buffer.lock().clear();
        let collector = self.spawn_collector(events);

        if let Err(e) = encoder.start().await {
            tracing::error!("Encoder failed to start: {}", e);
            drop(encoder);
            collector.abort();
            return Err(e);
        }

        self.elapsed.store(0, Ordering::Release);
        self.active.store(true, Ordering::Release);
        self.timer = Some(self.spawn_timer());
        self.collector = Some(collector);
        self.encoder = Some(encoder);
        self.mime_type = Some(mime_type.clone());
        *self.state.write() = RecordingState::Recording;

        tracing::info!(
            "Recording {} as {} ({}ms segments)",
            synthetic.id(),
            mime_type,
            options.timeslice.as_millis()
        );
        let _ = self.event_tx.send(RecordingEvent::Started(mime_type));
        Ok(())
    }

    /// Stop recording and seal the buffered segments.
    ///
    /// Returns once the encoder has flushed its tail segment.
    pub async fn stop(&mut self) -> RecordingResult<RecordingBlob> {
        if !self.is_recording() {
            return Err(RecordingError::NotRecording);
        }

        tracing::info!("Stopping recording");

        self.active.store(false, Ordering::Release);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        *self.state.write() = RecordingState::Idle;

        if let Some(mut encoder) = self.encoder.take() {
            if let Err(e) = encoder.stop().await {
                tracing::error!("Encoder failed to finalize: {}", e);
                let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            }
            // Dropping the encoder closes its sink, which ends the collector
        }
        if let Some(collector) = self.collector.take() {
            if let Err(e) = collector.await {
                tracing::warn!("Segment collector ended abnormally: {}", e);
            }
        }

        let elapsed = self.elapsed_secs();
        let mime_type = self.mime_type.clone().unwrap_or_default();
        let blob = self.buffer.lock().seal(mime_type, elapsed);

        tracing::info!(
            "Recording stopped: {} segments, {} bytes, {}s",
            blob.segment_count,
            blob.len(),
            elapsed
        );
        let _ = self.event_tx.send(RecordingEvent::Stopped);
        Ok(blob)
    }

    /// Append segments in arrival order until the encoder reports `Stopped`
    fn spawn_collector(&self, mut events: mpsc::UnboundedReceiver<EncoderEvent>) -> JoinHandle<()> {
        let buffer = self.buffer.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    EncoderEvent::DataAvailable(data) => {
                        let len = data.len();
                        let mut buffer = buffer.lock();
                        if buffer.data_available(data) {
                            tracing::debug!("Segment {} buffered ({} bytes)", buffer.len() - 1, len);
                        }
                    }
                    EncoderEvent::Error(message) => {
                        tracing::warn!("Encoder reported: {}", message);
                        let _ = event_tx.send(RecordingEvent::Error(message));
                    }
                    EncoderEvent::Stopped => break,
                }
            }
        })
    }

    /// Count whole seconds, starting one second after start
    fn spawn_timer(&self) -> JoinHandle<()> {
        let elapsed = self.elapsed.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let secs = elapsed.fetch_add(1, Ordering::AcqRel) + 1;
                let _ = event_tx.send(RecordingEvent::Tick(secs));
            }
        })
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
