//! memo-insight - Voice memo capture and streaming insight ingestion
//!
//! Records a short spoken memo, uploads it to an analysis backend and
//! rebuilds an insight card from the backend's server-sent event stream as
//! it arrives.
//!
//! # Architecture
//!
//! Two subsystems meet in the [`core::MemoOrchestrator`]:
//! - Recording: a lifecycle state machine over a capture device, with live
//!   metering, pause-aware elapsed time and a hard duration cap
//! - Ingestion: upload, then a typed, ordered, resumable event stream that
//!   progressively fills the card; dropped connections resume from the
//!   last applied event id
//!
//! # Modules
//!
//! - `recording`: Controller, metering, capability traits
//! - `ingest`: SSE decoding, backend client, aggregator, stream engine
//! - `core`: Screen-level orchestration
//! - `domain`: Data structures (RecordingState, StreamEvent, InsightCard)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Upload a memo and follow its analysis
//! memo-insight analyze memo.m4a
//!
//! # Resume a dropped session from a cursor
//! memo-insight attach <session-id> --last-event-id 17
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod recording;

// Re-export main types at crate root for convenience
pub use core::MemoOrchestrator;
pub use domain::{
    EventPayload, EventType, InsightCard, RecordingArtifact, RecordingState, StreamEvent,
    StreamSession, StreamStatus,
};
pub use error::{DeviceError, RecordingError, StreamError};
pub use ingest::{InsightAggregator, InsightBackend, InsightSnapshot, RetryPolicy, StreamEngine};
pub use recording::{RecordingController, RecordingSnapshot};
