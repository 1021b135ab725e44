//! Core orchestration logic.
//!
//! - MemoOrchestrator: record → stop → generate insight, plus leaving
//!   the screen mid-recording

pub mod orchestrator;

pub use orchestrator::MemoOrchestrator;
