//! Stream session bookkeeping for one analysis run.

use serde::{Deserialize, Serialize};

use super::events::FinalSummary;

/// Where an analysis run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Nothing started (or reset)
    Idle,

    /// Audio is being uploaded
    Uploading,

    /// Upload acknowledged, consuming events
    Streaming,

    /// `final` event received
    Completed,

    /// Terminal failure, see `error_message`
    Failed,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl StreamStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Progress of one upload + stream run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSession {
    /// Assigned by the backend on upload acknowledgment
    pub session_id: Option<String>,

    /// Cursor of the last processed event
    pub last_event_id: Option<String>,

    /// Last reported backend phase
    pub phase: Option<String>,

    /// Human readable message accompanying `phase`
    pub message: Option<String>,

    /// 0-100, frozen once the first stream event arrives
    pub upload_progress_pct: u8,

    /// Set once any stream event has been observed
    pub streaming_started: bool,

    pub status: StreamStatus,

    /// Terminal failure message; never set together with `completion`
    pub error_message: Option<String>,

    /// Contents of the `final` event
    pub completion: Option<FinalSummary>,
}

impl StreamSession {
    /// Advance upload progress. Ignored once streaming started or when the
    /// value would go backwards.
    pub fn report_upload_progress(&mut self, pct: u8) -> bool {
        let pct = pct.min(100);
        if self.streaming_started || pct <= self.upload_progress_pct {
            return false;
        }
        self.upload_progress_pct = pct;
        true
    }
}
