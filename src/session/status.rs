//! User-facing status reports

use crate::capture::CaptureError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Error,
    Success,
}

/// One status line for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub level: StatusLevel,
    pub message: String,
}

impl StatusReport {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == StatusLevel::Error
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Friendly explanation of a screen acquisition failure
pub fn screen_error_message(error: &CaptureError) -> String {
    match error {
        CaptureError::PermissionDenied(_) => {
            "Screen sharing permission denied. Please allow screen sharing and try again.".to_string()
        }
        CaptureError::NoSourceFound(_) => {
            "No screen source found. Make sure you have a screen to share.".to_string()
        }
        CaptureError::Unsupported(_) => {
            "Screen sharing is not supported in this environment. If on macOS, grant Screen Recording permission."
                .to_string()
        }
        CaptureError::UserCancelled(_) => "Screen sharing was cancelled.".to_string(),
        other => other.to_string(),
    }
}
