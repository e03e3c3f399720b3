//! Recording system module
//!
//! This module implements the recording pipeline:
//! - Encoder / EncoderFactory capabilities bound to a source
//! - RecordingController owning the record/stop state machine
//! - FFmpeg-backed WebM encoder

pub mod controller;
pub mod encoder;
pub mod ffmpeg;
pub mod state;

pub use controller::{RecordingController, RecordingEvent};
pub use encoder::{
    negotiate_mime_type, Encoder, EncoderEvent, EncoderFactory, EncoderOptions, EncoderSink,
    RecordingError, RecordingResult,
};
pub use ffmpeg::FfmpegEncoderFactory;
pub use state::{format_elapsed, EncodedSegment, RecordingBlob, RecordingState, SegmentBuffer};
