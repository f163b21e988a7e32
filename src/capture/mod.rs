//! Capture source surface
//!
//! This module defines the frames the pipeline consumes and the trait a
//! capture backend implements to feed it.

pub mod frame;
pub mod traits;

pub use frame::{AudioFrame, CapturedFrame, ContentRect, VideoFrame};
pub use traits::{CaptureSource, DisplayInfo, FrameSink};
