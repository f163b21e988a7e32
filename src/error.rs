//! Error types and handling
//!
//! Common error types used across the capture pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no display available for capture")]
    NoDisplayAvailable,

    #[error("screen recording permission not granted")]
    PermissionUnavailable,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("container initialization failed: {0}")]
    ContainerInit(String),

    #[error("container writer failed: {0}")]
    WriterFailed(String),

    #[error("capture source error: {0}")]
    CaptureSource(String),
}

/// Error response for an embedding frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<CaptureError> for ErrorResponse {
    fn from(error: CaptureError) -> Self {
        let code = match &error {
            CaptureError::Io(_) => "IO_ERROR",
            CaptureError::NoDisplayAvailable => "NO_DISPLAY_AVAILABLE",
            CaptureError::PermissionUnavailable => "PERMISSION_UNAVAILABLE",
            CaptureError::AlreadyRecording => "ALREADY_RECORDING",
            CaptureError::NotRecording => "NOT_RECORDING",
            CaptureError::ContainerInit(_) => "CONTAINER_INIT_FAILED",
            CaptureError::WriterFailed(_) => "WRITER_FAILED",
            CaptureError::CaptureSource(_) => "CAPTURE_SOURCE_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;
