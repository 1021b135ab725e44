//! Stream Engine Integration Tests
//!
//! Runs the engine against a scripted backend: each stream connection
//! replays a fixed list of frames, then either closes, drops or hangs.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use memo_insight::domain::StreamStatus;
use memo_insight::error::StreamError;
use memo_insight::ingest::{
    FrameStream, InsightBackend, ProgressFn, RetryPolicy, SseFrame, StreamEngine, UploadAck,
};

enum Connection {
    /// Deliver frames, then end the stream
    Frames(Vec<Result<SseFrame, StreamError>>),
    /// Deliver frames, then stay open forever
    Hang(Vec<Result<SseFrame, StreamError>>),
    /// Fail to open
    Refuse(StreamError),
}

struct ScriptedBackend {
    upload: Mutex<Option<Result<UploadAck, StreamError>>>,
    connections: Mutex<VecDeque<Connection>>,
    cursors: Mutex<Vec<Option<String>>>,
    progress: Mutex<Option<ProgressFn>>,
    uploads: AtomicUsize,
}

impl ScriptedBackend {
    fn new(upload: Result<UploadAck, StreamError>, connections: Vec<Connection>) -> Arc<Self> {
        Arc::new(Self {
            upload: Mutex::new(Some(upload)),
            connections: Mutex::new(connections.into()),
            cursors: Mutex::new(Vec::new()),
            progress: Mutex::new(None),
            uploads: AtomicUsize::new(0),
        })
    }

    fn opens(&self) -> usize {
        self.cursors.lock().unwrap().len()
    }

    fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl InsightBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn upload(&self, _audio: &Path, progress: ProgressFn) -> Result<UploadAck, StreamError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        progress(30);
        progress(80);
        *self.progress.lock().unwrap() = Some(progress);
        self.upload
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(StreamError::UploadFailed("no scripted upload".into())))
    }

    async fn open_stream(
        &self,
        _session_id: &str,
        last_event_id: Option<&str>,
    ) -> Result<FrameStream, StreamError> {
        self.cursors
            .lock()
            .unwrap()
            .push(last_event_id.map(str::to_string));

        let next = self.connections.lock().unwrap().pop_front();
        match next {
            Some(Connection::Frames(frames)) => Ok(Box::pin(stream::iter(frames))),
            Some(Connection::Hang(frames)) => {
                Ok(Box::pin(stream::iter(frames).chain(stream::pending())))
            }
            Some(Connection::Refuse(e)) => Err(e),
            None => Err(StreamError::StreamDisconnected("connection refused".into())),
        }
    }
}

fn ack(session_id: &str) -> Result<UploadAck, StreamError> {
    Ok(UploadAck {
        session_id: Some(session_id.to_string()),
        status: "processing".to_string(),
        message: "Audio received".to_string(),
        ..Default::default()
    })
}

fn frame(id: &str, event: &str, data: &str) -> Result<SseFrame, StreamError> {
    Ok(SseFrame {
        event: event.to_string(),
        data: data.to_string(),
        id: Some(id.to_string()),
        retry_ms: None,
    })
}

fn dropped() -> Result<SseFrame, StreamError> {
    Err(StreamError::StreamDisconnected("connection reset by peer".into()))
}

fn header(id: &str) -> Result<SseFrame, StreamError> {
    frame(
        id,
        "card_header",
        r#"{"title":"Morning focus","vibe":"calm","card_type":"reflection"}"#,
    )
}

fn final_event(id: &str) -> Result<SseFrame, StreamError> {
    frame(
        id,
        "final",
        r#"{"session_id":"s-1","status":"completed","processing_time_ms":1840.5}"#,
    )
}

fn engine(backend: &Arc<ScriptedBackend>, policy: RetryPolicy) -> StreamEngine {
    StreamEngine::new(backend.clone(), policy)
}

#[tokio::test(start_paused = true)]
async fn test_full_run_builds_card() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![Connection::Frames(vec![
            frame("1", "status", r#"{"phase":"analyzing","message":"Listening back"}"#),
            header("2"),
            frame("3", "summary_bullets", r#"["Deep work first","Email after 11"]"#),
            frame("4", "recall_anchor", r#""the 9am block""#),
            frame("5", "action_item", r#""Block 9-11am""#),
            final_event("6"),
        ])],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let snapshot = engine.process_audio_file("file:///tmp/memo.m4a").await.unwrap();

    assert_eq!(snapshot.session.status, StreamStatus::Completed);
    assert_eq!(snapshot.session.session_id.as_deref(), Some("s-1"));
    assert_eq!(snapshot.session.last_event_id.as_deref(), Some("6"));
    assert_eq!(snapshot.session.phase.as_deref(), Some("analyzing"));
    assert_eq!(snapshot.session.upload_progress_pct, 100);
    assert!(snapshot.session.error_message.is_none());
    assert_eq!(
        snapshot.session.completion.as_ref().map(|c| c.processing_time_ms),
        Some(1840.5)
    );

    assert_eq!(snapshot.card.title.as_deref(), Some("Morning focus"));
    assert_eq!(snapshot.card.bullets, vec!["Deep work first", "Email after 11"]);
    assert_eq!(snapshot.card.recall_anchor.as_deref(), Some("the 9am block"));
    assert_eq!(snapshot.card.action_items, vec!["Block 9-11am"]);
    assert_eq!(backend.cursors(), vec![None]);
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_opens_no_stream() {
    let backend = ScriptedBackend::new(
        Err(StreamError::UploadFailed("HTTP 413: file too large".into())),
        vec![Connection::Frames(vec![final_event("1")])],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let result = engine.process_audio_file("/tmp/memo.m4a").await;

    assert!(matches!(result, Err(StreamError::UploadFailed(_))));
    assert_eq!(backend.opens(), 0);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.session.status, StreamStatus::Failed);
    assert!(snapshot.session.error_message.is_some());
    assert!(snapshot.session.session_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missing_session_id_is_upload_failure() {
    let backend = ScriptedBackend::new(Ok(UploadAck::default()), vec![]);
    let engine = engine(&backend, RetryPolicy::default());

    let result = engine.process_audio_file("/tmp/memo.m4a").await;

    assert!(matches!(result, Err(StreamError::UploadFailed(_))));
    assert_eq!(backend.opens(), 0);
    assert_eq!(engine.snapshot().session.status, StreamStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resumes_from_cursor_without_duplicates() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![
            Connection::Frames(vec![
                header("1"),
                frame("2", "summary_bullets", r#"["one","two"]"#),
                dropped(),
            ]),
            Connection::Frames(vec![
                // Server replays the last event it is unsure we received
                frame("2", "summary_bullets", r#"["one","two"]"#),
                frame("3", "summary_bullets", r#"["three"]"#),
                final_event("4"),
            ]),
        ],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let snapshot = engine.process_audio_file("/tmp/memo.m4a").await.unwrap();

    assert_eq!(snapshot.card.bullets, vec!["one", "two", "three"]);
    assert_eq!(snapshot.card.title.as_deref(), Some("Morning focus"));
    assert_eq!(backend.cursors(), vec![None, Some("2".to_string())]);
    assert_eq!(snapshot.session.status, StreamStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_stream_closed_before_final_reconnects() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![
            Connection::Frames(vec![header("1")]),
            Connection::Frames(vec![final_event("2")]),
        ],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let snapshot = engine.process_audio_file("/tmp/memo.m4a").await.unwrap();

    assert_eq!(backend.cursors(), vec![None, Some("1".to_string())]);
    assert!(snapshot.is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_server_error_is_terminal() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![
            Connection::Frames(vec![header("1"), frame("2", "error", "Transcription failed")]),
            Connection::Frames(vec![final_event("3")]),
        ],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let result = engine.process_audio_file("/tmp/memo.m4a").await;

    match result {
        Err(StreamError::ServerError(message)) => assert_eq!(message, "Transcription failed"),
        other => panic!("expected server error, got {:?}", other),
    }
    assert_eq!(backend.opens(), 1);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.session.status, StreamStatus::Failed);
    assert_eq!(
        snapshot.session.error_message.as_deref(),
        Some("Transcription failed")
    );
    assert!(snapshot.session.completion.is_none());
    // What arrived before the error is kept
    assert!(snapshot.card.has_header());
}

#[tokio::test(start_paused = true)]
async fn test_client_error_on_open_is_terminal() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![Connection::Refuse(StreamError::ServerError(
            "HTTP 404 Not Found: unknown session".into(),
        ))],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let result = engine.process_audio_file("/tmp/memo.m4a").await;

    assert!(matches!(result, Err(StreamError::ServerError(_))));
    assert_eq!(backend.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_escalates_to_stream_failed() {
    let backend = ScriptedBackend::new(ack("s-1"), vec![]);
    let policy = RetryPolicy {
        max_attempts: 2,
        ..Default::default()
    };
    let engine = engine(&backend, policy);

    let result = engine.process_audio_file("/tmp/memo.m4a").await;

    match result {
        Err(StreamError::StreamFailed { attempts, last_error }) => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("connection refused"));
        }
        other => panic!("expected stream failure, got {:?}", other),
    }
    assert_eq!(backend.opens(), 3);
    assert_eq!(engine.snapshot().session.status, StreamStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_progress_between_drops_resets_budget() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![
            Connection::Frames(vec![header("1"), dropped()]),
            Connection::Frames(vec![frame("2", "action_item", "Call Sam"), dropped()]),
            Connection::Frames(vec![frame("3", "action_item", "Book flights"), dropped()]),
            Connection::Frames(vec![final_event("4")]),
        ],
    );
    let policy = RetryPolicy {
        max_attempts: 1,
        ..Default::default()
    };
    let engine = engine(&backend, policy);

    let snapshot = engine.process_audio_file("/tmp/memo.m4a").await.unwrap();

    assert_eq!(snapshot.card.action_items, vec!["Call Sam", "Book flights"]);
    assert_eq!(backend.opens(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_is_terminal() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![Connection::Frames(vec![frame("1", "card_header", "{not json")])],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let result = engine.process_audio_file("/tmp/memo.m4a").await;

    assert!(matches!(result, Err(StreamError::Decode(_))));
    assert_eq!(backend.opens(), 1);
    assert_eq!(engine.snapshot().session.status, StreamStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_events_advance_cursor() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![
            Connection::Frames(vec![frame("1", "heartbeat", "{}"), dropped()]),
            Connection::Frames(vec![final_event("2")]),
        ],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let snapshot = engine.process_audio_file("/tmp/memo.m4a").await.unwrap();

    assert_eq!(backend.cursors(), vec![None, Some("1".to_string())]);
    assert!(snapshot.card.is_empty());
    assert!(snapshot.session.streaming_started);
}

#[tokio::test(start_paused = true)]
async fn test_late_upload_progress_is_ignored() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![Connection::Frames(vec![header("1"), final_event("2")])],
    );
    let engine = engine(&backend, RetryPolicy::default());

    engine.process_audio_file("/tmp/memo.m4a").await.unwrap();

    let progress = backend.progress.lock().unwrap().clone().unwrap();
    progress(10);

    assert_eq!(engine.snapshot().session.upload_progress_pct, 100);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_running_stream() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![Connection::Hang(vec![
            header("1"),
            frame("2", "summary_bullets", r#"["stale"]"#),
        ])],
    );
    let engine = Arc::new(engine(&backend, RetryPolicy::default()));

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.process_audio_file("/tmp/memo.m4a").await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.snapshot().card.bullets, vec!["stale"]);

    engine.reset_stream_state();
    let result = running.await.unwrap();

    assert!(matches!(result, Err(StreamError::Cancelled)));
    let snapshot = engine.snapshot();
    assert!(snapshot.card.is_empty());
    assert_eq!(snapshot.session.status, StreamStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_new_run_never_sees_previous_results() {
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![
            Connection::Frames(vec![
                frame("1", "summary_bullets", r#"["old bullet"]"#),
                frame("2", "action_item", "old item"),
                final_event("3"),
            ]),
            Connection::Frames(vec![
                frame("1", "summary_bullets", r#"["new bullet"]"#),
                final_event("2"),
            ]),
        ],
    );
    let engine = engine(&backend, RetryPolicy::default());

    engine.process_audio_file("/tmp/first.m4a").await.unwrap();
    engine.reset_stream_state();
    *backend.upload.lock().unwrap() = Some(ack("s-2"));

    let snapshot = engine.process_audio_file("/tmp/second.m4a").await.unwrap();

    assert_eq!(snapshot.card.bullets, vec!["new bullet"]);
    assert!(snapshot.card.action_items.is_empty());
    assert_eq!(snapshot.session.session_id.as_deref(), Some("s-2"));
}

#[tokio::test(start_paused = true)]
async fn test_resume_stream_sends_cursor() {
    let backend = ScriptedBackend::new(
        Err(StreamError::UploadFailed("unused".into())),
        vec![Connection::Frames(vec![
            frame("8", "action_item", "Follow up with Ana"),
            final_event("9"),
        ])],
    );
    let engine = engine(&backend, RetryPolicy::default());

    let snapshot = engine.resume_stream("s-7", Some("7")).await.unwrap();

    assert_eq!(backend.cursors(), vec![Some("7".to_string())]);
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(snapshot.session.session_id.as_deref(), Some("s-7"));
    assert_eq!(snapshot.card.action_items, vec!["Follow up with Ana"]);
}

#[tokio::test(start_paused = true)]
async fn test_server_retry_hint_delays_reconnect() {
    let mut hinted = frame("1", "card_header", r#"{"title":"T","vibe":"v","card_type":"c"}"#);
    if let Ok(frame) = hinted.as_mut() {
        frame.retry_ms = Some(4_000);
    }
    let backend = ScriptedBackend::new(
        ack("s-1"),
        vec![
            Connection::Frames(vec![hinted, dropped()]),
            Connection::Frames(vec![final_event("2")]),
        ],
    );
    let policy = RetryPolicy {
        initial_delay_ms: 10,
        ..Default::default()
    };
    let engine = engine(&backend, policy);

    let started = tokio::time::Instant::now();
    let snapshot = engine.process_audio_file("/tmp/memo.m4a").await.unwrap();

    assert!(snapshot.is_complete());
    assert!(started.elapsed() >= Duration::from_millis(4_000));
    assert_eq!(backend.cursors(), vec![None, Some("1".to_string())]);
}
