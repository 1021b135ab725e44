//! Screen-level flow tying recording, transcription and insight streaming
//! together.
//!
//! One orchestrator owns at most one recording and one stream session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::RecordingArtifact;
use crate::error::{RecordingError, StreamError};
use crate::ingest::{InsightSnapshot, StreamEngine};
use crate::recording::{RecordingController, Transcriber};

/// Record a memo, then turn it into an insight card
pub struct MemoOrchestrator {
    controller: RecordingController,
    engine: Arc<StreamEngine>,
    transcriber: Arc<dyn Transcriber>,
    /// Elapsed seconds shown when the user pressed stop
    recorded_seconds: AtomicU64,
}

impl MemoOrchestrator {
    pub fn new(
        controller: RecordingController,
        engine: Arc<StreamEngine>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            controller,
            engine,
            transcriber,
            recorded_seconds: AtomicU64::new(0),
        }
    }

    pub fn controller(&self) -> &RecordingController {
        &self.controller
    }

    pub fn engine(&self) -> &StreamEngine {
        &self.engine
    }

    /// Start a fresh recording.
    ///
    /// Results of the previous memo are cleared first. Live transcription
    /// is best-effort.
    pub async fn begin_recording(&self) -> Result<(), RecordingError> {
        self.engine.reset_stream_state();
        self.transcriber.reset();
        self.recorded_seconds.store(0, Ordering::Release);

        self.controller.start().await?;

        if let Err(e) = self.transcriber.start().await {
            warn!(error = %e, "Live transcription unavailable");
        }
        info!("Memo recording started");
        Ok(())
    }

    pub async fn pause_recording(&self) -> Result<(), RecordingError> {
        self.controller.pause().await
    }

    pub async fn resume_recording(&self) -> Result<(), RecordingError> {
        self.controller.resume().await
    }

    /// Stop recording. `None` if nothing was recording or a stop was
    /// already running.
    pub async fn stop_recording(&self) -> Option<RecordingArtifact> {
        let elapsed = self.controller.elapsed_seconds().await;
        self.recorded_seconds.store(elapsed, Ordering::Release);
        self.transcriber.stop();

        self.controller.stop().await
    }

    /// Upload the artifact and stream its analysis
    pub async fn generate_insight(
        &self,
        artifact: &RecordingArtifact,
    ) -> Result<InsightSnapshot, StreamError> {
        info!(artifact = %artifact.id, duration = artifact.duration_seconds, "Generating insight");
        self.engine.process_audio_file(&artifact.location).await
    }

    /// Leaving the screen: transcription stops first, then the recording
    /// is thrown away even if a stop is mid-flight.
    pub async fn leave(&self) -> bool {
        self.transcriber.stop();
        let discarded = self.controller.discard().await;
        debug!(discarded, "Left memo screen");
        discarded
    }

    pub fn transcript(&self) -> String {
        self.transcriber.transcript()
    }

    /// Duration remembered by the last `stop_recording`
    pub fn recorded_seconds(&self) -> u64 {
        self.recorded_seconds.load(Ordering::Acquire)
    }
}
