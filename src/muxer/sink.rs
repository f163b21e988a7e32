//! Container sink abstraction
//!
//! The writer's state machine is container-format agnostic; everything
//! format-specific sits behind [`ContainerSink`]. The shipped
//! implementation is MP4 ([`super::mp4::Mp4Sink`]); tests substitute
//! recording sinks through [`SinkFactory`].

use crate::error::CaptureResult;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Output video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
}

impl VideoCodec {
    /// Pick the codec for the current platform.
    ///
    /// HEVC encoders ship on effectively all Apple hardware this pipeline
    /// targets; elsewhere H.264 remains the safe default.
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            VideoCodec::Hevc
        } else {
            VideoCodec::H264
        }
    }
}

/// Everything a sink needs to create the container and its tracks
#[derive(Debug, Clone)]
pub struct SinkSpec {
    /// Output file path
    pub destination: PathBuf,

    /// Video width, already floored to an even value
    pub width: u32,

    /// Video height, already floored to an even value
    pub height: u32,

    /// Video track codec
    pub codec: VideoCodec,

    /// Whether to add an audio track
    pub audio: bool,

    /// Codec configuration blobs from the first frame, in codec order
    pub video_params: Vec<Bytes>,
}

/// One sample ready for the container, in output (media) time
#[derive(Debug, Clone)]
pub struct MediaSample {
    /// Presentation time relative to the session start
    pub media_time: Duration,

    /// Sample duration
    pub duration: Duration,

    /// Encoded payload
    pub payload: Bytes,

    /// Sync-sample flag (always true for audio)
    pub keyframe: bool,
}

/// A live output container with one video track and an optional audio track
pub trait ContainerSink: Send {
    /// Append a sample to the video track
    fn append_video(&mut self, sample: &MediaSample) -> CaptureResult<()>;

    /// Append a sample to the audio track
    fn append_audio(&mut self, sample: &MediaSample) -> CaptureResult<()>;

    /// Whether the video track can accept a sample right now
    fn video_ready(&self) -> bool {
        true
    }

    /// Whether the audio track can accept a sample right now
    fn audio_ready(&self) -> bool {
        true
    }

    /// Whether the underlying writer is still usable. Once this returns
    /// false the session is failed and no further samples are sent.
    fn healthy(&self) -> bool {
        true
    }

    /// Finish both tracks and write out the container metadata
    fn finalize(&mut self) -> CaptureResult<()>;
}

/// Constructor for the lazily-created sink, invoked once geometry is known
pub type SinkFactory =
    Arc<dyn Fn(&SinkSpec) -> CaptureResult<Box<dyn ContainerSink>> + Send + Sync>;
