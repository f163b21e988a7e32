//! Recording system module
//!
//! This module implements the recording lifecycle:
//! - RecordingController driving the Idle → Recording ⇄ Paused state machine
//! - Session and summary types shared with an embedding frontend

pub mod controller;
pub mod state;

pub use controller::{discard_if_empty, RecordingController, RecordingEvent};
pub use state::{
    default_output_name, RecordingConfig, RecordingSession, RecordingState, RecordingSummary,
};
