//! Domain types for memo capture and insight ingestion.
//!
//! This module contains the core data structures:
//! - Recording: lifecycle state and the finished artifact
//! - Events: the typed analysis stream taxonomy
//! - Insight: the progressively built insight card
//! - Session: stream progress for one analysis run

pub mod events;
pub mod insight;
pub mod recording;
pub mod session;

// Re-export commonly used types
pub use events::{
    CardHeader, EventDecodeError, EventPayload, EventType, FinalSummary, StatusUpdate,
    StreamEvent,
};
pub use insight::{
    ActionPlan, Benchmarking, Explainability, ImpactReport, InsightCard, PatternAnalysis,
    RecallDecision, RecallHit, RecallMetrics, RecallPolicy, RecallResultData, StoredInsight,
};
pub use recording::{RecordingArtifact, RecordingState};
pub use session::{StreamSession, StreamStatus};
