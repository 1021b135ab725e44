//! The insight card and the recall payload attached to it.
//!
//! An `InsightCard` is filled in progressively by stream events. Header
//! fields and the recall anchor are set once; bullets and action items are
//! append-only.

use serde::{Deserialize, Serialize};

/// Progressively populated summary of one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightCard {
    pub title: Option<String>,
    pub vibe: Option<String>,
    pub card_type: Option<String>,

    /// Summary lines in arrival order
    pub bullets: Vec<String>,

    pub recall_anchor: Option<String>,

    /// Action items in arrival order
    pub action_items: Vec<String>,

    pub recall_result: Option<RecallResultData>,
}

impl InsightCard {
    /// True once the header event has been applied
    pub fn has_header(&self) -> bool {
        self.title.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome decided by the recall agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallDecision {
    ActionCreated,
    RecallOnly,
    NoHits,
}

/// Structured payload of the `recall_results` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallResultData {
    #[serde(default)]
    pub hits: Vec<RecallHit>,
    pub pattern_analysis: PatternAnalysis,
    pub decision: RecallDecision,
    #[serde(default)]
    pub action_plan: Option<ActionPlan>,
    pub explainability: Explainability,
    #[serde(default)]
    pub impact_report: Option<ImpactReport>,
    #[serde(default)]
    pub trace: Vec<String>,
    pub metrics: RecallMetrics,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallHit {
    pub insight: StoredInsight,
    pub similarity_score: f64,
}

/// A previously stored insight matched by recall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredInsight {
    pub id: String,
    pub schema_version: u32,
    pub timestamp: String,
    pub anchor_text: String,
    #[serde(default)]
    pub themes_array: Vec<String>,
    pub source_session_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub dominant_theme: String,
    pub recurrence_count: u32,
    pub window_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub plan_id: String,
    pub title: String,
    #[serde(default)]
    pub recommended_steps: Vec<String>,
    pub related_theme: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explainability {
    pub why: String,
    pub policy: RecallPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallPolicy {
    pub similarity_threshold: f64,
    pub recurrence_threshold: u32,
    pub window_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub manual_baseline_seconds: f64,
    pub agent_execution_seconds: f64,
    pub efficiency_gain_multiplier: f64,
    #[serde(default)]
    pub agent_builder_tools_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallMetrics {
    pub recall_latency_ms: f64,
    pub analysis_latency_ms: f64,
    pub write_latency_ms: f64,
    pub total_time_ms: f64,
    pub benchmarking: Benchmarking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmarking {
    pub manual_process_est_seconds: f64,
    pub agent_process_seconds: f64,
    pub efficiency_gain_pct: f64,
    pub human_steps_automated: u32,
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A full `recall_results` payload as the backend sends it
    pub const RECALL_RESULTS_JSON: &str = r#"{
        "hits": [
            {
                "insight": {
                    "id": "ins_01",
                    "schema_version": 2,
                    "timestamp": "2026-10-01T09:12:00Z",
                    "anchor_text": "Block mornings for deep work",
                    "themes_array": ["focus", "planning"],
                    "source_session_hash": "a1b2c3"
                },
                "similarity_score": 0.87
            }
        ],
        "pattern_analysis": {
            "dominant_theme": "focus",
            "recurrence_count": 3,
            "window_days": 14
        },
        "decision": "action_created",
        "action_plan": {
            "plan_id": "plan_9",
            "title": "Protect focus time",
            "recommended_steps": ["Mute chat before 11am", "Book a recurring block"],
            "related_theme": "focus",
            "confidence": 0.8
        },
        "explainability": {
            "why": "Theme recurred 3 times in 14 days",
            "policy": {
                "similarity_threshold": 0.75,
                "recurrence_threshold": 3,
                "window_days": 14
            }
        },
        "impact_report": {
            "manual_baseline_seconds": 900,
            "agent_execution_seconds": 4.2,
            "efficiency_gain_multiplier": 214.3,
            "agent_builder_tools_used": ["recall", "planner"]
        },
        "trace": ["recall", "analyze", "write"],
        "metrics": {
            "recall_latency_ms": 120,
            "analysis_latency_ms": 340,
            "write_latency_ms": 55,
            "total_time_ms": 515,
            "benchmarking": {
                "manual_process_est_seconds": 900,
                "agent_process_seconds": 4.2,
                "efficiency_gain_pct": 99.5,
                "human_steps_automated": 6
            }
        },
        "run_id": "run_42",
        "timestamp": "2026-10-19T15:07:00Z"
    }"#;
}
