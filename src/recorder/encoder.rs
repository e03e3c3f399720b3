//! Encoder capability
//!
//! An encoder is bound to one source and emits segments through an
//! `EncoderSink` while running. `stop` flushes the pending tail segment and
//! finishes with `EncoderEvent::Stopped`.

use crate::capture::MediaSource;
use crate::utils::error::ErrorKind;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur while recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("No combined stream to record")]
    NotCombined,

    #[error("Not currently recording")]
    NotRecording,

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecordingError::NotCombined => ErrorKind::NotCombined,
            RecordingError::NotRecording => ErrorKind::NotRecording,
            RecordingError::AlreadyRecording => ErrorKind::AlreadyRecording,
            RecordingError::EncoderUnavailable(_) => ErrorKind::EncoderUnavailable,
            RecordingError::Encoding(_) | RecordingError::Io(_) => ErrorKind::Internal,
        }
    }
}

pub type RecordingResult<T> = Result<T, RecordingError>;

/// Notifications from a running encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// A segment of encoded data, possibly empty
    DataAvailable(Vec<u8>),
    /// The encoder has flushed everything; no events follow
    Stopped,
    /// A non-fatal failure worth reporting
    Error(String),
}

pub type EncoderSink = mpsc::UnboundedSender<EncoderEvent>;

/// How an encoder should be configured
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOptions {
    pub mime_type: String,
    /// Segment emission interval
    pub timeslice: Duration,
    pub crf: u8,
}

/// A running encoder attached to one source
#[async_trait]
pub trait Encoder: Send {
    /// Container/codec type being produced
    fn mime_type(&self) -> &str;

    /// Start encoding and emitting segments
    async fn start(&mut self) -> RecordingResult<()>;

    /// Finalize: emit the tail segment, then `Stopped`
    async fn stop(&mut self) -> RecordingResult<()>;
}

/// Creates encoders for a source
pub trait EncoderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(
        &self,
        source: &MediaSource,
        options: &EncoderOptions,
        sink: EncoderSink,
    ) -> RecordingResult<Box<dyn Encoder>>;
}

/// First preferred mime type the factory can produce
pub fn negotiate_mime_type<'a>(
    factory: &dyn EncoderFactory,
    preferred: &'a [String],
) -> RecordingResult<&'a str> {
    preferred
        .iter()
        .map(String::as_str)
        .find(|mime| factory.is_type_supported(mime))
        .ok_or_else(|| {
            RecordingError::EncoderUnavailable(format!(
                "none of the container types are supported: {}",
                preferred.join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Vp8Only;

    impl EncoderFactory for Vp8Only {
        fn is_type_supported(&self, mime_type: &str) -> bool {
            mime_type == "video/webm;codecs=vp8"
        }

        fn create(
            &self,
            _source: &MediaSource,
            _options: &EncoderOptions,
            _sink: EncoderSink,
        ) -> RecordingResult<Box<dyn Encoder>> {
            Err(RecordingError::EncoderUnavailable("test".to_string()))
        }
    }

    #[test]
    fn test_negotiate_picks_first_supported() {
        let preferred = vec![
            "video/webm;codecs=vp9".to_string(),
            "video/webm;codecs=vp8".to_string(),
            "video/webm".to_string(),
        ];
        assert_eq!(
            negotiate_mime_type(&Vp8Only, &preferred).unwrap(),
            "video/webm;codecs=vp8"
        );
    }

    #[test]
    fn test_negotiate_none_supported() {
        let preferred = vec!["video/mp4".to_string()];
        let err = negotiate_mime_type(&Vp8Only, &preferred).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncoderUnavailable);
    }
}
