//! Error taxonomy for recording and stream ingestion.

use thiserror::Error;

use crate::domain::{EventDecodeError, RecordingState};

/// Failure reported by a capability collaborator (capture device, notifier,
/// transcriber)
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DeviceError(pub String);

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Recording side failures. All are recoverable by the user retrying.
#[derive(Debug, Clone, Error)]
pub enum RecordingError {
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to pause recording: {0}")]
    PauseFailed(String),

    #[error("Failed to resume recording: {0}")]
    ResumeFailed(String),

    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        state: RecordingState,
        operation: &'static str,
    },
}

/// Streaming side failures
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Failure before a session was established; never retried
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Transport dropped; retried with the last cursor
    #[error("Stream disconnected: {0}")]
    StreamDisconnected(String),

    /// Reconnect budget exhausted
    #[error("Stream failed after {attempts} reconnect attempts: {last_error}")]
    StreamFailed { attempts: u32, last_error: String },

    /// Explicit failure reported by the backend
    #[error("Server error: {0}")]
    ServerError(String),

    /// Known event with an undecodable payload
    #[error("{0}")]
    Decode(String),

    /// The run was superseded by a reset
    #[error("Stream cancelled")]
    Cancelled,
}

impl StreamError {
    /// Only transport drops are retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StreamDisconnected(_))
    }
}

impl From<EventDecodeError> for StreamError {
    fn from(err: EventDecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}
