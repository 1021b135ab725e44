//! Text rendering for recordings and insight cards.

use std::fmt::{Display, Write};

use chrono::{DateTime, TimeZone};

use crate::domain::{InsightCard, RecallDecision, StreamSession, StreamStatus};
use crate::ingest::InsightSnapshot;

/// `HH:MM:SS`
pub fn format_clock(seconds: u64) -> String {
    let hrs = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hrs, mins, secs)
}

/// `Oct 19 - 3:07PM`
pub fn format_recording_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%b %-d - %-I:%M%p").to_string()
}

/// Fraction to percent text. Non-finite input renders as `0%`.
pub fn to_percentage(value: f64, fraction_digits: usize) -> String {
    if !value.is_finite() {
        return "0%".to_string();
    }
    format!("{:.*}%", fraction_digits, value * 100.0)
}

/// One-line progress for a stream session
pub fn render_status(session: &StreamSession) -> String {
    match session.status {
        StreamStatus::Idle => "Idle".to_string(),
        StreamStatus::Uploading => format!("Uploading... {}%", session.upload_progress_pct),
        StreamStatus::Streaming => match (&session.phase, &session.message) {
            (Some(phase), Some(message)) => format!("[{}] {}", phase, message),
            (Some(phase), None) => format!("[{}]", phase),
            _ => "Streaming...".to_string(),
        },
        StreamStatus::Completed => match &session.completion {
            Some(done) => format!("Completed in {:.0}ms", done.processing_time_ms),
            None => "Completed".to_string(),
        },
        StreamStatus::Failed => format!(
            "Failed: {}",
            session.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Full card as plain text
pub fn render_card(card: &InsightCard) -> String {
    let mut out = String::new();

    if let Some(title) = &card.title {
        let _ = writeln!(out, "{}", title);
    }
    match (&card.vibe, &card.card_type) {
        (Some(vibe), Some(card_type)) => {
            let _ = writeln!(out, "{} · {}", vibe, card_type);
        }
        (Some(only), None) | (None, Some(only)) => {
            let _ = writeln!(out, "{}", only);
        }
        (None, None) => {}
    }

    if !card.bullets.is_empty() {
        let _ = writeln!(out, "\nSummary:");
        for bullet in &card.bullets {
            let _ = writeln!(out, "  • {}", bullet);
        }
    }

    if let Some(anchor) = &card.recall_anchor {
        let _ = writeln!(out, "\nRecall anchor: {}", anchor);
    }

    if !card.action_items.is_empty() {
        let _ = writeln!(out, "\nAction items:");
        for item in &card.action_items {
            let _ = writeln!(out, "  [ ] {}", item);
        }
    }

    if let Some(recall) = &card.recall_result {
        let decision = match recall.decision {
            RecallDecision::ActionCreated => "action created",
            RecallDecision::RecallOnly => "recall only",
            RecallDecision::NoHits => "no hits",
        };
        let _ = writeln!(
            out,
            "\nRecall: {} ({} hits, theme '{}' seen {}x in {} days)",
            decision,
            recall.hits.len(),
            recall.pattern_analysis.dominant_theme,
            recall.pattern_analysis.recurrence_count,
            recall.pattern_analysis.window_days
        );
        for hit in &recall.hits {
            let _ = writeln!(
                out,
                "  {} {}",
                to_percentage(hit.similarity_score, 0),
                hit.insight.anchor_text
            );
        }
        if let Some(plan) = &recall.action_plan {
            let _ = writeln!(
                out,
                "  Plan: {} ({} confidence)",
                plan.title,
                to_percentage(plan.confidence, 0)
            );
            for step in &plan.recommended_steps {
                let _ = writeln!(out, "    - {}", step);
            }
        }
        let _ = writeln!(out, "  Why: {}", recall.explainability.why);
    }

    out
}

/// Status line followed by the card
pub fn render_snapshot(snapshot: &InsightSnapshot) -> String {
    let mut out = render_status(&snapshot.session);
    out.push('\n');
    if !snapshot.card.is_empty() {
        out.push('\n');
        out.push_str(&render_card(&snapshot.card));
    }
    out
}
