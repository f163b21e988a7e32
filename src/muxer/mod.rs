//! Capture-to-file muxing
//!
//! This module implements the container writing pipeline:
//! - TimebaseReconciler to splice pause gaps out of the output timeline
//! - AudioStagingQueue for audio arriving before the video track starts
//! - ContainerSink abstraction with the MP4 implementation
//! - ContainerWriter owning the per-session container state machine

pub mod mp4;
pub mod sink;
pub mod staging;
pub mod timebase;
pub mod writer;

pub use self::mp4::Mp4Sink;
pub use sink::{ContainerSink, MediaSample, SinkFactory, SinkSpec, VideoCodec};
pub use staging::AudioStagingQueue;
pub use timebase::TimebaseReconciler;
pub use writer::{ContainerPhase, ContainerWriter, WriterOptions, WriterStats};
