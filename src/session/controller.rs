//! Session controller
//!
//! Maps UI actions onto the acquirer, compositor, recorder and persistence
//! gateway, enforcing the legal order and reporting a status for each.

use super::state::{SessionSnapshot, SessionState};
use super::status::{screen_error_message, StatusLevel, StatusReport};
use crate::capture::{SourceAcquirer, SourceKind, SourceProvider, TerminationNotice};
use crate::compositor::{CompositeError, Compositor};
use crate::config::RecorderSettings;
use crate::persistence::{PersistenceGateway, SaveMethod, SaveResult};
use crate::recorder::{format_elapsed, EncoderFactory, RecordingController, RecordingError, RecordingEvent};
use crate::utils::error::AppResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Shared handle the desktop shell and the termination pump lock
pub type SessionHandle = Arc<Mutex<SessionController>>;

/// Actions the UI can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionAction {
    StartScreenCapture,
    StartCameraCapture,
    CombineStreams,
    StartRecording,
    StopRecording,
    StopAll,
}

/// Orchestrates one capture session
pub struct SessionController {
    acquirer: SourceAcquirer,
    compositor: Compositor,
    recorder: RecordingController,
    persistence: PersistenceGateway,
    state: SessionState,
    last_status: Option<StatusReport>,
    last_save: Option<SaveResult>,
    status_tx: broadcast::Sender<StatusReport>,
}

impl SessionController {
    /// Build a session. The returned receiver carries host-initiated source
    /// ends; feed it to [`run_termination_loop`].
    pub fn new(
        settings: &RecorderSettings,
        provider: Arc<dyn SourceProvider>,
        encoders: Arc<dyn EncoderFactory>,
        persistence: PersistenceGateway,
    ) -> (Self, mpsc::UnboundedReceiver<TerminationNotice>) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(100);

        let controller = Self {
            acquirer: SourceAcquirer::new(provider, settings.capture.clone(), notice_tx),
            compositor: Compositor::new(settings.compositor.clone()),
            recorder: RecordingController::new(encoders, settings.recording.clone()),
            persistence,
            state: SessionState::default(),
            last_status: None,
            last_save: None,
            status_tx,
        };
        (controller, notice_rx)
    }

    /// Subscribe to status reports
    pub fn subscribe(&self) -> broadcast::Receiver<StatusReport> {
        self.status_tx.subscribe()
    }

    /// Subscribe to recorder events (elapsed ticks and the like)
    pub fn recording_events(&self) -> broadcast::Receiver<RecordingEvent> {
        self.recorder.subscribe()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn last_status(&self) -> Option<&StatusReport> {
        self.last_status.as_ref()
    }

    /// Outcome of the most recent save
    pub fn last_save(&self) -> Option<&SaveResult> {
        self.last_save.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let elapsed = self.recorder.elapsed_secs();
        SessionSnapshot {
            screen_live: self.state.screen_live(),
            camera_live: self.state.camera_live(),
            combined: self.state.combined(),
            recording: self.recorder.is_recording(),
            elapsed_secs: elapsed,
            elapsed_label: format_elapsed(elapsed),
            mime_type: self.recorder.mime_type().map(str::to_string),
            status: self.last_status.clone(),
        }
    }

    pub async fn dispatch(&mut self, action: SessionAction) -> AppResult<StatusReport> {
        match action {
            SessionAction::StartScreenCapture => self.start_screen_capture().await,
            SessionAction::StartCameraCapture => self.start_camera_capture().await,
            SessionAction::CombineStreams => self.combine_streams(),
            SessionAction::StartRecording => self.start_recording().await,
            SessionAction::StopRecording => self.stop_recording().await,
            SessionAction::StopAll => Ok(self.stop_all().await),
        }
    }

    pub async fn start_screen_capture(&mut self) -> AppResult<StatusReport> {
        self.report(StatusReport::info("Requesting screen access..."));

        let source = match self.acquirer.acquire_screen().await {
            Ok(source) => source,
            Err(e) => {
                self.report(StatusReport::error(format!("Error: {}", screen_error_message(&e))));
                return Err(e.into());
            }
        };

        if self.state.screen.is_some() {
            self.release_source(SourceKind::Screen).await;
        }
        self.state.screen = Some(source);
        Ok(self.report(StatusReport::info("Screen capture started")))
    }

    pub async fn start_camera_capture(&mut self) -> AppResult<StatusReport> {
        self.report(StatusReport::info("Requesting camera access..."));

        let source = match self.acquirer.acquire_camera().await {
            Ok(source) => source,
            Err(e) => {
                self.report(StatusReport::error(format!("Error: {}", e)));
                return Err(e.into());
            }
        };

        if self.state.camera.is_some() {
            self.release_source(SourceKind::Camera).await;
        }
        self.state.camera = Some(source);
        Ok(self.report(StatusReport::info("Camera capture started")))
    }

    pub fn combine_streams(&mut self) -> AppResult<StatusReport> {
        if self.recorder.is_recording() {
            let e = RecordingError::AlreadyRecording;
            self.report(StatusReport::error(format!("Error combining streams: {}", e)));
            return Err(e.into());
        }

        let composition = match self
            .compositor
            .combine(self.state.screen.as_ref(), self.state.camera.as_ref())
        {
            Ok(composition) => composition,
            Err(e @ CompositeError::NotReady(_)) => {
                self.report(StatusReport::error("Please start both screen and camera capture first"));
                return Err(e.into());
            }
        };

        if let Some(previous) = self.state.composition.replace(composition) {
            previous.stop();
        }
        Ok(self.report(StatusReport::success("Streams combined successfully")))
    }

    pub async fn start_recording(&mut self) -> AppResult<StatusReport> {
        let Some(composition) = self.state.composition.clone().filter(|c| c.is_live()) else {
            self.report(StatusReport::error("Please combine streams first"));
            return Err(RecordingError::NotCombined.into());
        };

        self.report(StatusReport::info("Starting recording..."));
        if let Err(e) = self.recorder.start(Some(composition.synthetic())).await {
            self.report(StatusReport::error(format!("Error starting recording: {}", e)));
            return Err(e.into());
        }

        // Draw every tick until the recorder clears its activity flag
        composition.run_while(self.recorder.activity_flag());
        Ok(self.report(StatusReport::success("Recording started")))
    }

    pub async fn stop_recording(&mut self) -> AppResult<StatusReport> {
        if !self.recorder.is_recording() {
            let e = RecordingError::NotRecording;
            self.report(StatusReport::error(format!("Error stopping recording: {}", e)));
            return Err(e.into());
        }
        self.finish_recording().await
    }

    /// Stop whatever is running and release every source. Safe from any state.
    pub async fn stop_all(&mut self) -> StatusReport {
        if self.recorder.is_recording() {
            if let Err(e) = self.finish_recording().await {
                tracing::error!("Failed to finalize recording during stop all: {}", e);
            }
        }
        self.state.release_all();
        self.report(StatusReport::info("All streams stopped"))
    }

    /// React to the host ending a source. Notices for sources no longer held
    /// are ignored.
    pub async fn handle_source_ended(&mut self, notice: TerminationNotice) -> Option<StatusReport> {
        let held = match notice.kind {
            SourceKind::Screen => self.state.screen.as_ref(),
            SourceKind::Camera => self.state.camera.as_ref(),
            SourceKind::Synthetic => None,
        };
        if held.map(|source| source.id()) != Some(notice.source_id) {
            tracing::debug!("Ignoring stale end notice for {} {}", notice.kind, notice.source_id);
            return None;
        }

        self.release_source(notice.kind).await;
        let message = match notice.kind {
            SourceKind::Screen => "Screen capture ended",
            _ => "Camera capture ended",
        };
        Some(self.report(StatusReport::info(message)))
    }

    /// Tear down what depends on `kind`, then release it. A running recording
    /// is finalized and persisted first.
    async fn release_source(&mut self, kind: SourceKind) {
        if self.recorder.is_recording() {
            if let Err(e) = self.finish_recording().await {
                tracing::error!("Failed to finalize recording after {} ended: {}", kind, e);
            }
        }
        if let Some(composition) = self.state.composition.take() {
            composition.stop();
        }

        let source = match kind {
            SourceKind::Screen => self.state.screen.take(),
            SourceKind::Camera => self.state.camera.take(),
            SourceKind::Synthetic => None,
        };
        if let Some(source) = source {
            source.stop();
        }
    }

    /// Stop the recorder, then persist the sealed blob
    async fn finish_recording(&mut self) -> AppResult<StatusReport> {
        let blob = self.recorder.stop().await?;
        self.report(StatusReport::info("Recording stopped"));

        self.report(StatusReport::info("Saving video..."));
        let result = self.persistence.save(&blob).await;
        let status = match (&result, result.method) {
            (SaveResult { success: true, path: Some(path), .. }, SaveMethod::Dialog) => {
                StatusReport::success(format!("Video saved successfully to: {}", path))
            }
            (SaveResult { success: true, .. }, _) => StatusReport::success("Video downloaded successfully"),
            (SaveResult { error, .. }, _) => StatusReport::error(format!(
                "Error saving video: {}",
                error.as_deref().unwrap_or("unknown error")
            )),
        };
        self.last_save = Some(result);
        Ok(self.report(status))
    }

    fn report(&mut self, status: StatusReport) -> StatusReport {
        match status.level {
            StatusLevel::Error => tracing::error!("{}", status.message),
            _ => tracing::info!("{}", status.message),
        }
        self.last_status = Some(status.clone());
        // No subscribers is fine
        let _ = self.status_tx.send(status.clone());
        status
    }
}

/// Forward host-initiated source ends into the session until every sender
/// is gone
pub async fn run_termination_loop(
    session: SessionHandle,
    mut notices: mpsc::UnboundedReceiver<TerminationNotice>,
) {
    while let Some(notice) = notices.recv().await {
        session.lock().await.handle_source_ended(notice).await;
    }
    tracing::debug!("Termination loop finished");
}
