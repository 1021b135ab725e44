//! Recording session state and the finished audio artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a recording session
///
/// `Idle -> Recording -> {Paused <-> Recording} -> Stopping -> Stopped`, and
/// any non-terminal state may move to `Discarded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// No capture device held yet
    Idle,

    /// Capturing, both timers running
    Recording,

    /// Capture suspended, no timers running
    Paused,

    /// Stop or discard in flight
    Stopping,

    /// Finished and released
    Stopped,

    /// Abandoned and released
    Discarded,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

impl RecordingState {
    /// Stopped and Discarded accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Discarded)
    }

    /// A capture device handle is held in these states
    pub fn holds_device(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

/// Finished audio produced by a stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingArtifact {
    /// Local identifier for this capture
    pub id: Uuid,

    /// Location reference reported by the capture device
    pub location: String,

    /// Elapsed recording time, pauses excluded, clamped to the cap
    pub duration_seconds: u64,

    /// When the recording finished
    pub recorded_at: DateTime<Utc>,
}

impl RecordingArtifact {
    pub fn new(location: String, duration_seconds: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
            duration_seconds,
            recorded_at: Utc::now(),
        }
    }

    /// Last path component of the location, if any
    pub fn file_name(&self) -> &str {
        self.location
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.location.as_str())
    }
}
