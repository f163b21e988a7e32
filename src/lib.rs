//! screenmux - live capture-to-file muxing with pause/resume reconciliation.
//!
//! This crate is the recording core of a screen-capture utility: it takes
//! time-stamped frames from a pluggable capture source, lazily opens an MP4
//! container once the frame geometry is known, rewrites presentation
//! timestamps so paused intervals leave no gap in the file, and finalizes
//! the container even when a session degenerates (zero frames, writer
//! failure mid-stream).
//!
//! The entry point is [`RecordingController`], constructed around a
//! [`CaptureSource`] implementation supplied by the embedding application.

pub mod capture;
pub mod error;
pub mod muxer;
pub mod recorder;

pub use capture::{AudioFrame, CaptureSource, CapturedFrame, DisplayInfo, FrameSink, VideoFrame};
pub use error::{CaptureError, CaptureResult};
pub use muxer::{ContainerPhase, ContainerWriter, VideoCodec, WriterOptions, WriterStats};
pub use recorder::{
    default_output_name, discard_if_empty, RecordingConfig, RecordingController, RecordingEvent,
    RecordingSession, RecordingState, RecordingSummary,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for binaries embedding the pipeline.
///
/// Library code only emits through `tracing`; calling this is optional and
/// must happen at most once per process.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenmux=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
