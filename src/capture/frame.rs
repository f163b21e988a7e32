//! Frame types delivered by capture sources
//!
//! Frames are opaque, time-stamped payloads: the capture source (and its
//! encoder) produces them, the muxer consumes them. Timestamps are raw
//! source presentation times on the capture clock; the muxer rewrites them
//! before anything reaches the container.

use bytes::Bytes;
use std::time::Duration;

/// Content rectangle reported by the capture source alongside a frame.
///
/// Auxiliary metadata only. The decoded pixel-buffer dimensions on the
/// frame itself are authoritative when both are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One encoded video frame from the capture source
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Encoded sample payload
    pub payload: Bytes,

    /// Raw presentation timestamp on the source clock
    pub pts: Duration,

    /// Display duration of this frame
    pub duration: Duration,

    /// Decoded pixel-buffer width
    pub width: u32,

    /// Decoded pixel-buffer height
    pub height: u32,

    /// Content rect metadata, if the source reports one
    pub content_rect: Option<ContentRect>,

    /// Whether this sample is a sync (key) frame
    pub keyframe: bool,

    /// Codec configuration blobs carried on sync frames (e.g. the
    /// encoder's sequence/picture parameter sets), in codec order
    pub parameter_sets: Vec<Bytes>,
}

impl VideoFrame {
    /// Resolve the output geometry for this frame.
    ///
    /// Pixel-buffer dimensions win over the content rect; returns `None`
    /// when neither yields a usable size.
    pub fn geometry(&self) -> Option<(u32, u32)> {
        if self.width > 0 && self.height > 0 {
            return Some((self.width, self.height));
        }
        self.content_rect
            .filter(|r| r.width > 0 && r.height > 0)
            .map(|r| (r.width, r.height))
    }
}

/// One encoded audio frame from the capture source
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Encoded sample payload
    pub payload: Bytes,

    /// Raw presentation timestamp on the source clock
    pub pts: Duration,

    /// Playback duration of this frame
    pub duration: Duration,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count (the output track is mono)
    pub channels: u16,
}

/// A frame flowing through the pipeline
#[derive(Debug, Clone)]
pub enum CapturedFrame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, rect: Option<ContentRect>) -> VideoFrame {
        VideoFrame {
            payload: Bytes::new(),
            pts: Duration::ZERO,
            duration: Duration::from_millis(33),
            width,
            height,
            content_rect: rect,
            keyframe: true,
            parameter_sets: Vec::new(),
        }
    }

    #[test]
    fn test_geometry_prefers_pixel_buffer() {
        let rect = ContentRect { x: 0, y: 0, width: 100, height: 100 };
        let f = frame(1920, 1080, Some(rect));
        assert_eq!(f.geometry(), Some((1920, 1080)));
    }

    #[test]
    fn test_geometry_falls_back_to_content_rect() {
        let rect = ContentRect { x: 0, y: 0, width: 1280, height: 720 };
        let f = frame(0, 0, Some(rect));
        assert_eq!(f.geometry(), Some((1280, 720)));
    }

    #[test]
    fn test_geometry_unresolvable() {
        assert_eq!(frame(0, 0, None).geometry(), None);
        let empty = ContentRect { x: 0, y: 0, width: 0, height: 0 };
        assert_eq!(frame(0, 0, Some(empty)).geometry(), None);
    }
}
