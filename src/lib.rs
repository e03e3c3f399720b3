//! Screencam - record your screen with a picture-in-picture camera.
//!
//! Library crate for the Screencam application: source acquisition, the
//! picture-in-picture compositor, the WebM recorder, persistence and the
//! session controller tying them together. The Tauri shell lives behind the
//! `desktop` feature.

pub mod capture;
pub mod compositor;
pub mod config;
pub mod persistence;
pub mod recorder;
pub mod session;
pub mod utils;

#[cfg(feature = "desktop")]
pub mod commands;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling it again is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screencam_lib=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(feature = "desktop")]
mod app {
    use crate::capture::native::NativeSourceProvider;
    use crate::commands;
    use crate::config::RecorderSettings;
    use crate::persistence::{documents_dir, DialogSink, DownloadSink, PersistenceGateway};
    use crate::recorder::{format_elapsed, FfmpegEncoderFactory, RecordingEvent};
    use crate::session::{run_termination_loop, SessionController, SessionHandle};
    use serde::Serialize;
    use std::sync::Arc;
    use tauri::{AppHandle, Emitter, Manager};
    use tokio::sync::broadcast::error::RecvError;
    use tokio::sync::{broadcast, Mutex};

    /// Payload of the `recording-tick` event
    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct RecordingTick {
        elapsed_secs: u64,
        label: String,
    }

    fn load_settings() -> RecorderSettings {
        let path = RecorderSettings::default_path();
        let loaded = RecorderSettings::load_or_default(path.as_deref()).and_then(|settings| {
            settings.validate()?;
            Ok(settings)
        });
        match loaded {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring invalid settings ({}), using defaults", e);
                RecorderSettings::default()
            }
        }
    }

    /// Relay broadcast values to the webview until the sender goes away
    fn forward<T, P>(app: AppHandle, mut rx: broadcast::Receiver<T>, event: &'static str, map: fn(T) -> Option<P>)
    where
        T: Clone + Send + 'static,
        P: Serialize + Clone + Send + 'static,
    {
        tauri::async_runtime::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(value) => {
                        if let Some(payload) = map(value) {
                            if let Err(e) = app.emit(event, payload) {
                                tracing::warn!("Failed to emit {}: {}", event, e);
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("{} listener lagged by {}", event, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        crate::init_tracing();
        tracing::info!("Starting Screencam v{}", env!("CARGO_PKG_VERSION"));

        let settings = load_settings();

        tauri::Builder::default()
            .plugin(tauri_plugin_dialog::init())
            .setup(move |app| {
                let encoders = Arc::new(FfmpegEncoderFactory::new(settings.recording.ffmpeg_path.clone()));
                if !encoders.is_available() {
                    tracing::warn!(
                        "ffmpeg not found at '{}'. Recording will be unavailable.",
                        settings.recording.ffmpeg_path
                    );
                }

                let download_dir = settings.output.resolved_download_dir();
                let persistence = PersistenceGateway::new(Arc::new(DownloadSink::new(download_dir)))
                    .with_dialog(Arc::new(DialogSink::new(app.handle().clone(), documents_dir())));

                let (controller, notices) = SessionController::new(
                    &settings,
                    Arc::new(NativeSourceProvider::new()),
                    encoders,
                    persistence,
                );

                forward(app.handle().clone(), controller.subscribe(), "session-status", Some);
                forward(
                    app.handle().clone(),
                    controller.recording_events(),
                    "recording-tick",
                    |event| match event {
                        RecordingEvent::Tick(secs) => Some(RecordingTick {
                            elapsed_secs: secs,
                            label: format_elapsed(secs),
                        }),
                        _ => None,
                    },
                );

                let session: SessionHandle = Arc::new(Mutex::new(controller));
                app.manage(session.clone());
                tauri::async_runtime::spawn(run_termination_loop(session, notices));
                Ok(())
            })
            .invoke_handler(tauri::generate_handler![
                commands::session::start_screen_capture,
                commands::session::start_camera_capture,
                commands::session::combine_streams,
                commands::session::start_recording,
                commands::session::stop_recording,
                commands::session::stop_all_streams,
                commands::session::get_session_snapshot,
                commands::session::get_last_save,
                commands::session::get_documents_path,
                commands::session::get_platform,
            ])
            .run(tauri::generate_context!())
            .expect("error while running tauri application");
    }
}

#[cfg(feature = "desktop")]
pub use app::run;
