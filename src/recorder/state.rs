//! Recording state management
//!
//! Defines the recording state machine and per-session bookkeeping.

use crate::muxer::VideoCodec;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Current state of the recording pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    Idle,
    /// Currently recording
    Recording,
    /// Recording is paused
    Paused,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Configuration for starting a recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    /// Output file path
    pub destination: PathBuf,

    /// Whether to capture and mux microphone audio
    pub capture_audio: bool,

    /// Video codec override; platform default when unset
    pub codec: Option<VideoCodec>,
}

/// One recording session, created on start and released on stop.
///
/// At most one session is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Session identifier
    pub id: Uuid,

    /// Output file path
    pub destination: PathBuf,

    /// Whether audio capture was requested
    pub capture_audio: bool,

    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl RecordingSession {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            destination: config.destination.clone(),
            capture_audio: config.capture_audio,
            created_at: Utc::now(),
        }
    }
}

/// Result of a completed recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    /// Path of the output file. A zero-byte file means the recording
    /// failed and should be discarded.
    pub destination: PathBuf,

    /// Emitted output duration in milliseconds (pause gaps excluded)
    pub duration_ms: u64,

    /// Video frames written
    pub video_frames: u64,

    /// Audio frames written
    pub audio_frames: u64,

    /// Frames dropped for reasons other than pausing
    pub video_dropped: u64,
    pub audio_dropped: u64,
}

/// Default output filename, stamped with the local time
pub fn default_output_name() -> String {
    format!("Recording {}.mp4", Local::now().format("%Y-%m-%d %H.%M.%S"))
}
