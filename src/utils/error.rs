//! Error types and handling
//!
//! Common error types used across the application.

use crate::capture::CaptureError;
use crate::compositor::CompositeError;
use crate::persistence::PersistenceError;
use crate::recorder::RecordingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure categories reported to the frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    PermissionDenied,
    NoSourceFound,
    Unsupported,
    UserCancelled,
    DeviceUnavailable,
    NotCombined,
    NotRecording,
    NotReady,
    EncoderUnavailable,
    PersistenceFailure,
    AlreadyRecording,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::NoSourceFound => "NO_SOURCE_FOUND",
            ErrorKind::Unsupported => "UNSUPPORTED",
            ErrorKind::UserCancelled => "USER_CANCELLED",
            ErrorKind::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            ErrorKind::NotCombined => "NOT_COMBINED",
            ErrorKind::NotRecording => "NOT_RECORDING",
            ErrorKind::NotReady => "NOT_READY",
            ErrorKind::EncoderUnavailable => "ENCODER_UNAVAILABLE",
            ErrorKind::PersistenceFailure => "PERSISTENCE_FAILURE",
            ErrorKind::AlreadyRecording => "ALREADY_RECORDING",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Capture(e) => e.kind(),
            AppError::Composite(e) => e.kind(),
            AppError::Recording(e) => e.kind(),
            AppError::Persistence(e) => e.kind(),
            AppError::Io(_) | AppError::Serialization(_) | AppError::Config(_) => ErrorKind::Internal,
        }
    }
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.kind().code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response: ErrorResponse = AppError::from(RecordingError::NotRecording).into();
        assert_eq!(response.code, "NOT_RECORDING");

        let response: ErrorResponse =
            AppError::from(CaptureError::PermissionDenied("screen".to_string())).into();
        assert_eq!(response.code, "PERMISSION_DENIED");
        assert!(response.message.contains("screen"));

        let response: ErrorResponse = AppError::Config("bad".to_string()).into();
        assert_eq!(response.code, "INTERNAL");
    }

    #[test]
    fn test_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::EncoderUnavailable).unwrap();
        assert_eq!(json, "\"ENCODER_UNAVAILABLE\"");
    }
}
