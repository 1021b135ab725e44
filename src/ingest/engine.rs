//! Stream engine: upload, then consume the insight event stream.
//!
//! A dropped connection is reopened with the last applied event id as the
//! cursor, under a bounded [`RetryPolicy`] that honors the server's `retry:`
//! hint. Upload failures, backend errors and malformed payloads are terminal.
//! Every failure leaves the session in `Failed`.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ResolvedConfig;
use crate::domain::StreamEvent;
use crate::error::StreamError;

use super::aggregator::{ApplyOutcome, InsightAggregator, InsightSnapshot};
use super::client::{HttpBackend, InsightBackend, ProgressFn};
use super::retry::RetryPolicy;

/// Drives one analysis run at a time into a shared [`InsightAggregator`]
pub struct StreamEngine {
    backend: Arc<dyn InsightBackend>,
    retry_policy: RetryPolicy,
    aggregator: InsightAggregator,
}

/// How a single connection ended without an error
enum ConnectionEnd {
    Completed,
    Closed,
}

impl StreamEngine {
    pub fn new(backend: Arc<dyn InsightBackend>, retry_policy: RetryPolicy) -> Self {
        Self {
            backend,
            retry_policy,
            aggregator: InsightAggregator::new(),
        }
    }

    /// HTTP backend with configured endpoints and retry budget
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(
            Arc::new(HttpBackend::new(config.api.clone())),
            config.stream.retry_policy.clone(),
        )
    }

    pub fn aggregator(&self) -> &InsightAggregator {
        &self.aggregator
    }

    pub fn snapshot(&self) -> InsightSnapshot {
        self.aggregator.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<InsightSnapshot> {
        self.aggregator.subscribe()
    }

    /// Clear session and card. A run still in progress is cancelled and
    /// can no longer touch the document.
    pub fn reset_stream_state(&self) {
        self.aggregator.reset();
    }

    /// Upload a recording and stream its analysis until `final`
    #[instrument(skip(self))]
    pub async fn process_audio_file(&self, location: &str) -> Result<InsightSnapshot, StreamError> {
        let generation = self.aggregator.reset();
        self.aggregator.begin_upload(generation)?;

        let path = audio_path(location);
        let progress: ProgressFn = {
            let aggregator = self.aggregator.clone();
            Arc::new(move |pct| aggregator.report_upload_progress(generation, pct))
        };

        info!(path = %path.display(), backend = self.backend.name(), "Uploading recording");

        let upload = tokio::select! {
            result = self.backend.upload(&path, progress) => result,
            _ = self.aggregator.cancelled(generation) => return Err(StreamError::Cancelled),
        };

        let ack = match upload {
            Ok(ack) => ack,
            Err(e) => {
                let e = match e {
                    StreamError::UploadFailed(_) => e,
                    other => StreamError::UploadFailed(other.to_string()),
                };
                return Err(self.terminate(generation, e));
            }
        };

        let Some(session_id) = ack.session_id.clone().filter(|id| !id.trim().is_empty()) else {
            let e = StreamError::UploadFailed("Upload response did not include a session id".into());
            return Err(self.terminate(generation, e));
        };

        self.aggregator.establish_session(generation, &session_id, &ack)?;
        info!(session_id = %session_id, status = %ack.status, "Upload acknowledged");

        self.consume(generation, &session_id).await
    }

    /// Attach to an existing session, resuming after `last_event_id`
    #[instrument(skip(self))]
    pub async fn resume_stream(
        &self,
        session_id: &str,
        last_event_id: Option<&str>,
    ) -> Result<InsightSnapshot, StreamError> {
        let generation = self.aggregator.reset();
        self.aggregator
            .attach_session(generation, session_id, last_event_id)?;

        self.consume(generation, session_id).await
    }

    async fn consume(
        &self,
        generation: u64,
        session_id: &str,
    ) -> Result<InsightSnapshot, StreamError> {
        // Consecutive reconnects without a new event in between
        let mut failures = 0u32;
        let mut server_hint_ms = None;

        loop {
            let seen_before = self.aggregator.events_seen();
            let cursor = self.aggregator.last_event_id();

            let result = tokio::select! {
                result = self.read_connection(
                    generation,
                    session_id,
                    cursor.as_deref(),
                    &mut server_hint_ms,
                ) => result,
                _ = self.aggregator.cancelled(generation) => Err(StreamError::Cancelled),
            };

            let e = match result {
                Ok(ConnectionEnd::Completed) => {
                    info!(session_id, "Insight stream completed");
                    return Ok(self.aggregator.snapshot());
                }
                Ok(ConnectionEnd::Closed) => {
                    StreamError::StreamDisconnected("Stream closed before final event".into())
                }
                Err(e) => e,
            };

            if !e.is_retryable() {
                return Err(self.terminate(generation, e));
            }

            if self.aggregator.events_seen() > seen_before {
                failures = 0;
            }
            failures += 1;

            if !self.retry_policy.should_retry(failures) {
                let e = StreamError::StreamFailed {
                    attempts: failures - 1,
                    last_error: e.to_string(),
                };
                return Err(self.terminate(generation, e));
            }

            let delay = self.retry_policy.delay_with_hint(failures, server_hint_ms);
            warn!(
                session_id,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                cursor = ?self.aggregator.last_event_id(),
                error = %e,
                "Stream dropped, reconnecting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.aggregator.cancelled(generation) => return Err(StreamError::Cancelled),
            }
        }
    }

    async fn read_connection(
        &self,
        generation: u64,
        session_id: &str,
        cursor: Option<&str>,
        server_hint_ms: &mut Option<u64>,
    ) -> Result<ConnectionEnd, StreamError> {
        let mut frames = self.backend.open_stream(session_id, cursor).await?;

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            if frame.retry_ms.is_some() {
                *server_hint_ms = frame.retry_ms;
            }

            let Some(event) = StreamEvent::decode(&frame.event, &frame.data, frame.id.clone())?
            else {
                debug!(event = %frame.event, id = ?frame.id, "Skipping unrecognized event");
                self.aggregator
                    .observe_unknown(generation, frame.id.as_deref())?;
                continue;
            };

            match self.aggregator.apply(generation, &event)? {
                ApplyOutcome::Completed => return Ok(ConnectionEnd::Completed),
                ApplyOutcome::ServerError(message) => {
                    return Err(StreamError::ServerError(message))
                }
                ApplyOutcome::Applied => {
                    debug!(event = event.event_type().as_str(), id = ?event.id, "Applied event")
                }
                ApplyOutcome::Unchanged => {
                    debug!(event = event.event_type().as_str(), id = ?event.id, "Event had no effect")
                }
            }
        }

        Ok(ConnectionEnd::Closed)
    }

    /// Force the terminal `Failed` state and hand the error back
    fn terminate(&self, generation: u64, e: StreamError) -> StreamError {
        if matches!(e, StreamError::Cancelled) {
            return e;
        }

        let message = match &e {
            StreamError::ServerError(message) => message.clone(),
            other => other.to_string(),
        };
        self.aggregator.fail(generation, &message);
        error!(error = %e, "Insight stream failed");
        e
    }
}

/// Recording locations may be `file://` URIs
fn audio_path(location: &str) -> PathBuf {
    PathBuf::from(location.strip_prefix("file://").unwrap_or(location))
}
