//! Typed events of the analysis stream.
//!
//! The backend emits named server-sent events. Each known name maps to one
//! `EventPayload` variant; unknown names decode to `None` and are skipped by
//! the engine so newer backends can add events without breaking clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::insight::RecallResultData;

/// A decoded event from the analysis stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Backend event id, used as the resume cursor and for deduplication
    pub id: Option<String>,

    /// Typed payload
    pub payload: EventPayload,
}

/// Names of the events understood by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Phase change with a human readable message
    Status,

    /// Title, vibe and card type (set once)
    CardHeader,

    /// Summary lines (appended)
    SummaryBullets,

    /// Recall anchor text (set once)
    RecallAnchor,

    /// A single action item (appended)
    ActionItem,

    /// Full recall payload (set once)
    RecallResults,

    /// Successful completion of the run
    Final,

    /// Backend-reported failure
    Error,
}

impl EventType {
    /// Map a wire event name to its type
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Self::Status),
            "card_header" => Some(Self::CardHeader),
            "summary_bullets" => Some(Self::SummaryBullets),
            "recall_anchor" => Some(Self::RecallAnchor),
            "action_item" => Some(Self::ActionItem),
            "recall_results" => Some(Self::RecallResults),
            "final" => Some(Self::Final),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::CardHeader => "card_header",
            Self::SummaryBullets => "summary_bullets",
            Self::RecallAnchor => "recall_anchor",
            Self::ActionItem => "action_item",
            Self::RecallResults => "recall_results",
            Self::Final => "final",
            Self::Error => "error",
        }
    }

    /// Final and Error end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Status(StatusUpdate),
    CardHeader(CardHeader),
    SummaryBullets(Vec<String>),
    RecallAnchor(String),
    ActionItem(String),
    RecallResults(Box<RecallResultData>),
    Final(FinalSummary),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub phase: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardHeader {
    pub title: String,
    #[serde(default)]
    pub vibe: String,
    #[serde(default)]
    pub card_type: String,
}

/// Payload of the terminal `final` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub session_id: String,
    pub status: String,
    #[serde(default)]
    pub processing_time_ms: f64,
}

/// Payload of a known event could not be decoded
#[derive(Debug, Clone, Error)]
#[error("Malformed '{event}' payload: {reason}")]
pub struct EventDecodeError {
    pub event: String,
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BulletsPayload {
    List(Vec<String>),
    Wrapped { bullets: Vec<String> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextPayload {
    Text(String),
    Anchor { anchor: String },
    Item { item: String },
    Message { message: String },
    Error { error: String },
}

impl TextPayload {
    fn into_text(self) -> String {
        match self {
            Self::Text(text)
            | Self::Anchor { anchor: text }
            | Self::Item { item: text }
            | Self::Message { message: text }
            | Self::Error { error: text } => text,
        }
    }
}

impl StreamEvent {
    /// Decode a named event. Unknown names yield `Ok(None)`.
    pub fn decode(
        name: &str,
        data: &str,
        id: Option<String>,
    ) -> Result<Option<Self>, EventDecodeError> {
        let Some(event_type) = EventType::from_name(name) else {
            return Ok(None);
        };

        let fail = |reason: String| EventDecodeError {
            event: name.to_string(),
            reason,
        };

        let payload = match event_type {
            EventType::Status => {
                EventPayload::Status(serde_json::from_str(data).map_err(|e| fail(e.to_string()))?)
            }
            EventType::CardHeader => EventPayload::CardHeader(
                serde_json::from_str(data).map_err(|e| fail(e.to_string()))?,
            ),
            EventType::SummaryBullets => {
                let bullets = match serde_json::from_str(data).map_err(|e| fail(e.to_string()))? {
                    BulletsPayload::List(list) => list,
                    BulletsPayload::Wrapped { bullets } => bullets,
                };
                EventPayload::SummaryBullets(bullets)
            }
            EventType::RecallAnchor => EventPayload::RecallAnchor(decode_text(data).map_err(fail)?),
            EventType::ActionItem => EventPayload::ActionItem(decode_text(data).map_err(fail)?),
            EventType::RecallResults => EventPayload::RecallResults(Box::new(
                serde_json::from_str(data).map_err(|e| fail(e.to_string()))?,
            )),
            EventType::Final => {
                EventPayload::Final(serde_json::from_str(data).map_err(|e| fail(e.to_string()))?)
            }
            EventType::Error => EventPayload::Error(decode_text(data).map_err(fail)?),
        };

        Ok(Some(Self { id, payload }))
    }

    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::Status(_) => EventType::Status,
            EventPayload::CardHeader(_) => EventType::CardHeader,
            EventPayload::SummaryBullets(_) => EventType::SummaryBullets,
            EventPayload::RecallAnchor(_) => EventType::RecallAnchor,
            EventPayload::ActionItem(_) => EventType::ActionItem,
            EventPayload::RecallResults(_) => EventType::RecallResults,
            EventPayload::Final(_) => EventType::Final,
            EventPayload::Error(_) => EventType::Error,
        }
    }
}

/// JSON string, a single-field object, or raw text
fn decode_text(data: &str) -> Result<String, String> {
    let trimmed = data.trim();
    match serde_json::from_str::<TextPayload>(trimmed) {
        Ok(payload) => Ok(payload.into_text()),
        Err(e) if trimmed.starts_with('{') || trimmed.starts_with('[') => Err(e.to_string()),
        Err(_) => Ok(trimmed.to_string()),
    }
}
