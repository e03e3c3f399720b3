//! Session Tauri commands

use crate::capture::Platform;
use crate::persistence::{documents_dir, SaveResult};
use crate::session::{SessionAction, SessionHandle, SessionSnapshot, StatusReport};
use crate::utils::error::ErrorResponse;
use tauri::State;

async fn dispatch(session: &SessionHandle, action: SessionAction) -> Result<StatusReport, ErrorResponse> {
    let mut session = session.lock().await;
    session.dispatch(action).await.map_err(ErrorResponse::from)
}

#[tauri::command]
pub async fn start_screen_capture(session: State<'_, SessionHandle>) -> Result<StatusReport, ErrorResponse> {
    dispatch(&session, SessionAction::StartScreenCapture).await
}

#[tauri::command]
pub async fn start_camera_capture(session: State<'_, SessionHandle>) -> Result<StatusReport, ErrorResponse> {
    dispatch(&session, SessionAction::StartCameraCapture).await
}

#[tauri::command]
pub async fn combine_streams(session: State<'_, SessionHandle>) -> Result<StatusReport, ErrorResponse> {
    dispatch(&session, SessionAction::CombineStreams).await
}

#[tauri::command]
pub async fn start_recording(session: State<'_, SessionHandle>) -> Result<StatusReport, ErrorResponse> {
    dispatch(&session, SessionAction::StartRecording).await
}

/// Stops the recorder and saves the video; the final status names the
/// destination
#[tauri::command]
pub async fn stop_recording(session: State<'_, SessionHandle>) -> Result<StatusReport, ErrorResponse> {
    dispatch(&session, SessionAction::StopRecording).await
}

#[tauri::command]
pub async fn stop_all_streams(session: State<'_, SessionHandle>) -> Result<StatusReport, ErrorResponse> {
    dispatch(&session, SessionAction::StopAll).await
}

#[tauri::command]
pub async fn get_session_snapshot(session: State<'_, SessionHandle>) -> Result<SessionSnapshot, String> {
    Ok(session.lock().await.snapshot())
}

#[tauri::command]
pub async fn get_last_save(session: State<'_, SessionHandle>) -> Result<Option<SaveResult>, String> {
    Ok(session.lock().await.last_save().cloned())
}

#[tauri::command]
pub async fn get_documents_path() -> Result<String, String> {
    documents_dir()
        .map(|path| path.to_string_lossy().to_string())
        .ok_or_else(|| "Could not determine documents directory".to_string())
}

#[tauri::command]
pub async fn get_platform() -> Result<Platform, String> {
    Ok(Platform::current())
}
