//! Live source acquisition
//!
//! The media model (`MediaSource` and its tracks), the host capability trait,
//! the acquirer implementing the screen/camera selection rules, and the
//! platform backends.

pub mod acquirer;
pub mod source;
pub mod traits;

#[cfg(feature = "native-capture")]
pub mod native;

pub use acquirer::{select_preferred_source, SourceAcquirer, TerminationNotice};
pub use source::{
    AudioChunk, AudioFormat, AudioTrack, EndReason, MediaSource, SourceKind, TrackSettings,
    VideoFrame, VideoTrack,
};
pub use traits::{
    CameraConstraints, CaptureError, CaptureResult, DesktopSource, DesktopSourceType, Platform,
    ScreenConstraints, SourceProvider,
};
