//! Insight aggregator: the shared result document.
//!
//! The engine applies stream events here; presentation reads snapshots or
//! subscribes to changes. Every run is tagged with a generation number.
//! `reset` bumps the generation, so a run that has been superseded can no
//! longer write into the document.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::{EventPayload, InsightCard, StreamEvent, StreamSession, StreamStatus};
use crate::error::StreamError;

use super::client::UploadAck;

/// Point-in-time copy of the document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsightSnapshot {
    pub session: StreamSession,
    pub card: InsightCard,
}

impl InsightSnapshot {
    pub fn is_complete(&self) -> bool {
        self.session.status == StreamStatus::Completed
    }
}

/// What applying one event did to the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Document changed
    Applied,

    /// Same event id seen before, or a set-once field already set
    Unchanged,

    /// `final` received
    Completed,

    /// Backend reported an error
    ServerError(String),
}

#[derive(Debug, Default)]
struct InsightDocument {
    session: StreamSession,
    card: InsightCard,
    applied_ids: HashSet<String>,
    /// Events observed in this generation, known or not
    events_seen: u64,
}

impl InsightDocument {
    fn snapshot(&self) -> InsightSnapshot {
        InsightSnapshot {
            session: self.session.clone(),
            card: self.card.clone(),
        }
    }

    fn observe(&mut self, id: Option<&str>) {
        let id = id.filter(|id| !id.is_empty());
        self.events_seen += 1;
        self.session.streaming_started = true;
        if self.session.status == StreamStatus::Uploading {
            self.session.status = StreamStatus::Streaming;
        }
        if let Some(id) = id {
            self.session.last_event_id = Some(id.to_string());
        }
    }

    fn apply(&mut self, event: &StreamEvent) -> ApplyOutcome {
        let id = event.id.as_deref().filter(|id| !id.is_empty());
        if let Some(id) = id {
            if self.applied_ids.contains(id) {
                return ApplyOutcome::Unchanged;
            }
        }
        self.observe(id);
        if let Some(id) = id {
            self.applied_ids.insert(id.to_string());
        }

        let card = &mut self.card;
        let session = &mut self.session;

        match &event.payload {
            EventPayload::Status(update) => {
                session.phase = Some(update.phase.clone());
                session.message = Some(update.message.clone());
                ApplyOutcome::Applied
            }
            EventPayload::CardHeader(header) => {
                if card.title.is_some() {
                    return ApplyOutcome::Unchanged;
                }
                card.title = Some(header.title.clone());
                card.vibe = Some(header.vibe.clone());
                card.card_type = Some(header.card_type.clone());
                ApplyOutcome::Applied
            }
            EventPayload::SummaryBullets(bullets) => {
                card.bullets.extend(bullets.iter().cloned());
                ApplyOutcome::Applied
            }
            EventPayload::RecallAnchor(anchor) => {
                if card.recall_anchor.is_some() {
                    return ApplyOutcome::Unchanged;
                }
                card.recall_anchor = Some(anchor.clone());
                ApplyOutcome::Applied
            }
            EventPayload::ActionItem(item) => {
                card.action_items.push(item.clone());
                ApplyOutcome::Applied
            }
            EventPayload::RecallResults(data) => {
                if card.recall_result.is_some() {
                    return ApplyOutcome::Unchanged;
                }
                card.recall_result = Some((**data).clone());
                ApplyOutcome::Applied
            }
            EventPayload::Final(summary) => {
                if session.session_id.is_none() {
                    session.session_id = Some(summary.session_id.clone());
                }
                session.completion = Some(summary.clone());
                session.status = StreamStatus::Completed;
                ApplyOutcome::Completed
            }
            EventPayload::Error(message) => {
                if session.completion.is_some() {
                    return ApplyOutcome::Unchanged;
                }
                session.error_message = Some(message.clone());
                session.status = StreamStatus::Failed;
                ApplyOutcome::ServerError(message.clone())
            }
        }
    }
}

struct Shared {
    document: Mutex<InsightDocument>,
    generation: watch::Sender<u64>,
    changes: watch::Sender<InsightSnapshot>,
}

/// Handle on the shared insight document. Clones share state.
#[derive(Clone)]
pub struct InsightAggregator {
    shared: Arc<Shared>,
}

impl Default for InsightAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightAggregator {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        let (changes, _) = watch::channel(InsightSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                document: Mutex::new(InsightDocument::default()),
                generation,
                changes,
            }),
        }
    }

    /// Clear everything and invalidate any run in progress.
    ///
    /// Returns the new generation.
    pub fn reset(&self) -> u64 {
        let mut document = self.shared.document.lock();
        *document = InsightDocument::default();
        let mut next = 0;
        self.shared.generation.send_modify(|generation| {
            *generation += 1;
            next = *generation;
        });
        self.publish(&document);
        debug!(generation = next, "Insight document reset");
        next
    }

    pub fn generation(&self) -> u64 {
        *self.shared.generation.borrow()
    }

    /// Fails with `Cancelled` when `generation` has been superseded
    pub fn ensure_current(&self, generation: u64) -> Result<(), StreamError> {
        if self.generation() == generation {
            Ok(())
        } else {
            Err(StreamError::Cancelled)
        }
    }

    /// Resolves once `generation` has been superseded by a reset
    pub async fn cancelled(&self, generation: u64) {
        let mut rx = self.shared.generation.subscribe();
        loop {
            if *rx.borrow_and_update() != generation {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn snapshot(&self) -> InsightSnapshot {
        self.shared.document.lock().snapshot()
    }

    /// Receiver that observes every change to the document
    pub fn subscribe(&self) -> watch::Receiver<InsightSnapshot> {
        self.shared.changes.subscribe()
    }

    pub fn last_event_id(&self) -> Option<String> {
        self.shared.document.lock().session.last_event_id.clone()
    }

    pub fn events_seen(&self) -> u64 {
        self.shared.document.lock().events_seen
    }

    pub(crate) fn begin_upload(&self, generation: u64) -> Result<(), StreamError> {
        self.mutate(generation, |document| {
            document.session.status = StreamStatus::Uploading;
        })
    }

    /// Upload progress; ignored once the first stream event arrived
    pub(crate) fn report_upload_progress(&self, generation: u64, pct: u8) {
        let _ = self.mutate(generation, |document| {
            document.session.report_upload_progress(pct);
        });
    }

    pub(crate) fn establish_session(
        &self,
        generation: u64,
        session_id: &str,
        ack: &UploadAck,
    ) -> Result<(), StreamError> {
        self.mutate(generation, |document| {
            document.session.report_upload_progress(100);
            document.session.session_id = Some(session_id.to_string());
            document.session.status = StreamStatus::Streaming;
            if !ack.message.is_empty() {
                document.session.message = Some(ack.message.clone());
            }
        })
    }

    /// Attach to an existing session, resuming after `cursor`
    pub(crate) fn attach_session(
        &self,
        generation: u64,
        session_id: &str,
        cursor: Option<&str>,
    ) -> Result<(), StreamError> {
        self.mutate(generation, |document| {
            document.session.session_id = Some(session_id.to_string());
            document.session.last_event_id = cursor
                .filter(|cursor| !cursor.is_empty())
                .map(str::to_string);
            document.session.status = StreamStatus::Streaming;
        })
    }

    /// Apply a decoded event
    pub fn apply(&self, generation: u64, event: &StreamEvent) -> Result<ApplyOutcome, StreamError> {
        let mut document = self.shared.document.lock();
        self.ensure_current(generation)?;
        let outcome = document.apply(event);
        if outcome != ApplyOutcome::Unchanged {
            self.publish(&document);
        }
        Ok(outcome)
    }

    /// An event this client does not understand still moves the cursor
    pub(crate) fn observe_unknown(
        &self,
        generation: u64,
        id: Option<&str>,
    ) -> Result<(), StreamError> {
        self.mutate(generation, |document| document.observe(id))
    }

    /// Record a terminal failure. A completed run is left untouched.
    pub(crate) fn fail(&self, generation: u64, message: &str) {
        let _ = self.mutate(generation, |document| {
            if document.session.status != StreamStatus::Completed {
                document.session.status = StreamStatus::Failed;
                document.session.error_message = Some(message.to_string());
            }
        });
    }

    fn mutate(
        &self,
        generation: u64,
        change: impl FnOnce(&mut InsightDocument),
    ) -> Result<(), StreamError> {
        let mut document = self.shared.document.lock();
        self.ensure_current(generation)?;
        change(&mut document);
        self.publish(&document);
        Ok(())
    }

    fn publish(&self, document: &InsightDocument) {
        self.shared.changes.send_replace(document.snapshot());
    }
}
