//! Recording state management
//!
//! Defines the recording state machine, the segment buffer and the sealed
//! recording blob.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Current state of the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Currently recording
    Recording,
}

/// One chunk of encoded media, numbered in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSegment {
    pub sequence: u64,
    pub data: Vec<u8>,
}

/// Append-only buffer of the segments of one recording
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    segments: Vec<EncodedSegment>,
    next_sequence: u64,
    discarded: u64,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything buffered and restart numbering
    pub fn clear(&mut self) {
        self.segments.clear();
        self.next_sequence = 0;
        self.discarded = 0;
    }

    /// Append a segment in arrival order. Empty segments are discarded.
    pub fn data_available(&mut self, data: Vec<u8>) -> bool {
        if data.is_empty() {
            self.discarded += 1;
            return false;
        }
        self.segments.push(EncodedSegment {
            sequence: self.next_sequence,
            data,
        });
        self.next_sequence += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of empty segments dropped since the last clear
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }

    pub fn segments(&self) -> &[EncodedSegment] {
        &self.segments
    }

    /// Concatenate all segments in emission order into one immutable blob.
    /// The buffer is left empty; segments are freed as they are copied.
    pub fn seal(&mut self, mime_type: impl Into<String>, elapsed_secs: u64) -> RecordingBlob {
        let segments = std::mem::take(&mut self.segments);
        let segment_count = segments.len();
        let mut bytes = Vec::with_capacity(segments.iter().map(|s| s.data.len()).sum());
        for segment in segments {
            bytes.extend_from_slice(&segment.data);
        }
        RecordingBlob {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            elapsed_secs,
            segment_count,
        }
    }
}

/// A finished recording, ready to be persisted
#[derive(Clone, PartialEq, Eq)]
pub struct RecordingBlob {
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
    pub elapsed_secs: u64,
    pub segment_count: usize,
}

impl RecordingBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for RecordingBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingBlob")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("elapsed_secs", &self.elapsed_secs)
            .field("segment_count", &self.segment_count)
            .finish()
    }
}

/// Render whole seconds as `MM:SS`
pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_segments_discarded() {
        let mut buffer = SegmentBuffer::new();
        assert!(buffer.data_available(vec![1, 2]));
        assert!(!buffer.data_available(Vec::new()));
        assert!(buffer.data_available(vec![3]));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.discarded(), 1);
        let sequences: Vec<u64> = buffer.segments().iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
    }

    #[test]
    fn test_seal_preserves_order() {
        let mut buffer = SegmentBuffer::new();
        buffer.data_available(b"head".to_vec());
        buffer.data_available(b"-mid-".to_vec());
        buffer.data_available(b"tail".to_vec());

        let blob = buffer.seal("video/webm", 3);
        assert_eq!(&blob.bytes[..], b"head-mid-tail");
        assert_eq!(blob.segment_count, 3);
        assert_eq!(blob.elapsed_secs, 3);
        assert_eq!(blob.mime_type, "video/webm");
    }

    #[test]
    fn test_seal_drains_buffer() {
        let mut buffer = SegmentBuffer::new();
        buffer.data_available(vec![1, 2, 3]);
        buffer.data_available(vec![4]);

        let blob = buffer.seal("video/webm", 1);
        assert_eq!(blob.len(), 4);
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
    }

    #[test]
    fn test_clear_resets_numbering() {
        let mut buffer = SegmentBuffer::new();
        buffer.data_available(vec![1]);
        buffer.data_available(Vec::new());
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.discarded(), 0);
        buffer.data_available(vec![2]);
        assert_eq!(buffer.segments()[0].sequence, 0);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(3), "00:03");
        assert_eq!(format_elapsed(75), "01:15");
        assert_eq!(format_elapsed(3600), "60:00");
    }
}
