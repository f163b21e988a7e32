//! Capture source abstraction
//!
//! Platform-agnostic surface between the pipeline and whatever produces
//! frames. Real sources wrap a platform capture API; tests use scripted
//! sources. The pipeline never reaches into a source beyond this trait.

use crate::capture::frame::{AudioFrame, CapturedFrame, VideoFrame};
use crate::error::CaptureResult;
use crate::muxer::ContainerWriter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Information about a display/screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    /// Unique display ID
    pub id: u32,

    /// Display name
    pub name: String,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Scale factor (e.g., 2.0 for Retina)
    pub scale_factor: f64,

    /// Whether this is the primary display
    pub is_primary: bool,

    /// Refresh rate in Hz (if available)
    pub refresh_rate: Option<u32>,
}

/// Handle a capture source pushes frames into.
///
/// Video frames go through a bounded channel consumed by a single task, so
/// per-frame muxing stays serialized; when the channel is full the frame is
/// dropped rather than blocking the source's delivery thread. Audio frames
/// go straight to the writer, which synchronizes its audio path internally
/// and may be called from any thread.
#[derive(Clone)]
pub struct FrameSink {
    video_tx: mpsc::Sender<VideoFrame>,
    writer: Arc<ContainerWriter>,
}

impl FrameSink {
    pub(crate) fn new(video_tx: mpsc::Sender<VideoFrame>, writer: Arc<ContainerWriter>) -> Self {
        Self { video_tx, writer }
    }

    /// Push a video frame. Returns false if the frame was dropped because
    /// the delivery channel is full.
    pub fn push_video(&self, frame: VideoFrame) -> bool {
        match self.video_tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("video delivery channel full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Push an audio frame
    pub fn push_audio(&self, frame: AudioFrame) {
        self.writer.append_audio_frame(frame);
    }

    /// Push either kind of frame. Returns false only when a video frame
    /// was dropped at the channel; audio is always accepted here and
    /// dropped later if the pipeline cannot use it.
    pub fn push(&self, frame: CapturedFrame) -> bool {
        match frame {
            CapturedFrame::Video(video) => self.push_video(video),
            CapturedFrame::Audio(audio) => {
                self.push_audio(audio);
                true
            }
        }
    }
}

/// A source of captured frames
///
/// Implementations deliver frames on their own threads via the [`FrameSink`]
/// handed to `start_capture`, and must release every sink clone once
/// `stop_capture` completes so the pipeline can drain and finalize.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Enumerate capture targets
    async fn displays(&self) -> CaptureResult<Vec<DisplayInfo>>;

    /// Whether screen-capture authorization is present.
    ///
    /// Advisory only: a missing permission is logged and the capture
    /// attempt proceeds, failing asynchronously if the platform denies it.
    fn has_permission(&self) -> bool;

    /// Begin delivering frames into the sink
    async fn start_capture(&mut self, sink: FrameSink) -> CaptureResult<()>;

    /// Stop delivering frames and release all sink clones
    async fn stop_capture(&mut self) -> CaptureResult<()>;
}
