//! Streaming insight ingestion.
//!
//! 1. **Client**: uploads the recording and opens the event stream
//! 2. **SSE**: decodes the byte stream into named, id-tagged frames
//! 3. **Aggregator**: applies typed events to the shared insight document
//! 4. **Engine**: drives a run end to end, reconnecting with the cursor
//!
//! # Architecture
//!
//! ```text
//! recording → upload → session_id → GET stream ─→ SseDecoder → StreamEvent
//!                                       ↑                          ↓
//!                                 Last-Event-ID ←── InsightAggregator → snapshots
//! ```

pub mod aggregator;
pub mod client;
pub mod engine;
pub mod retry;
pub mod sse;

// Re-export key types
pub use aggregator::{ApplyOutcome, InsightAggregator, InsightSnapshot};
pub use client::{FrameStream, HttpBackend, InsightBackend, ProgressFn, UploadAck};
pub use engine::StreamEngine;
pub use retry::RetryPolicy;
pub use sse::{frame_stream, SseDecoder, SseFrame};
