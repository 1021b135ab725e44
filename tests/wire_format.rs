//! Wire Format Integration Tests
//!
//! Raw `text/event-stream` bytes, split at awkward boundaries, through the
//! decoder into the aggregator.

use futures::stream::{self, StreamExt};
use memo_insight::domain::{RecallDecision, StreamEvent, StreamStatus};
use memo_insight::ingest::{frame_stream, ApplyOutcome, InsightAggregator};

const TRANSCRIPT: &str = concat!(
    ": connected\n\n",
    "id: 1\nevent: status\ndata: {\"phase\":\"transcribing\",\"message\":\"Listening back\"}\n\n",
    "id: 2\nevent: card_header\ndata: {\"title\":\"Café plans\",\"vibe\":\"upbeat\",\"card_type\":\"plan\"}\n\n",
    "id: 3\nevent: summary_bullets\ndata: [\"Try the new café\",\n",
    "data: \"Invite Léa\"]\n\n",
    "id: 4\nevent: recall_anchor\ndata: {\"anchor\":\"weekend café\"}\n\n",
    "id: 5\nevent: action_item\ndata: Text Léa about Saturday\n\n",
    "id: 6\nevent: progress_hint\ndata: {\"eta_ms\":1200}\n\n",
    "id: 7\nevent: recall_results\ndata: {\"hits\":[],",
    "\"pattern_analysis\":{\"dominant_theme\":\"social\",\"recurrence_count\":1,\"window_days\":14},",
    "\"decision\":\"recall_only\",",
    "\"explainability\":{\"why\":\"First mention\",\"policy\":{\"similarity_threshold\":0.75,\"recurrence_threshold\":3,\"window_days\":14}},",
    "\"metrics\":{\"recall_latency_ms\":12,\"analysis_latency_ms\":80,\"write_latency_ms\":5,\"total_time_ms\":97,",
    "\"benchmarking\":{\"manual_process_est_seconds\":300,\"agent_process_seconds\":1.5,\"efficiency_gain_pct\":99.5,\"human_steps_automated\":4}}}\n\n",
    "id: 8\nevent: final\ndata: {\"session_id\":\"s-77\",\"status\":\"completed\",\"processing_time_ms\":2210}\n\n",
);

async fn replay(chunk_size: usize) -> InsightAggregator {
    let bytes = TRANSCRIPT.as_bytes();
    let chunks: Vec<Result<Vec<u8>, String>> = bytes
        .chunks(chunk_size)
        .map(|c| Ok(c.to_vec()))
        .collect();

    let aggregator = InsightAggregator::new();
    let generation = aggregator.reset();

    let mut frames = Box::pin(frame_stream(stream::iter(chunks)));
    while let Some(frame) = frames.next().await {
        let frame = frame.unwrap();
        let Some(event) = StreamEvent::decode(&frame.event, &frame.data, frame.id).unwrap() else {
            continue;
        };
        if aggregator.apply(generation, &event).unwrap() == ApplyOutcome::Completed {
            break;
        }
    }
    aggregator
}

#[tokio::test]
async fn test_transcript_builds_card_at_any_chunking() {
    for chunk_size in [1, 3, 7, 64, 4096] {
        let snapshot = replay(chunk_size).await.snapshot();
        let card = snapshot.card;

        assert_eq!(card.title.as_deref(), Some("Café plans"), "chunk {}", chunk_size);
        assert_eq!(card.bullets, vec!["Try the new café", "Invite Léa"]);
        assert_eq!(card.recall_anchor.as_deref(), Some("weekend café"));
        assert_eq!(card.action_items, vec!["Text Léa about Saturday"]);
        assert_eq!(
            card.recall_result.map(|r| r.decision),
            Some(RecallDecision::RecallOnly)
        );

        assert_eq!(snapshot.session.status, StreamStatus::Completed);
        assert_eq!(snapshot.session.session_id.as_deref(), Some("s-77"));
        assert_eq!(snapshot.session.last_event_id.as_deref(), Some("8"));
    }
}

#[tokio::test]
async fn test_empty_ids_do_not_swallow_events() {
    let body: Vec<Result<&'static [u8], String>> = vec![Ok(concat!(
        "id:\nevent: action_item\ndata: \"first\"\n\n",
        "id:\nevent: action_item\ndata: \"second\"\n\n",
    )
    .as_bytes())];

    let aggregator = InsightAggregator::new();
    let generation = aggregator.reset();

    let mut frames = Box::pin(frame_stream(stream::iter(body)));
    while let Some(frame) = frames.next().await {
        let frame = frame.unwrap();
        let event = StreamEvent::decode(&frame.event, &frame.data, frame.id)
            .unwrap()
            .unwrap();
        assert_eq!(aggregator.apply(generation, &event).unwrap(), ApplyOutcome::Applied);
    }

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.card.action_items, vec!["first", "second"]);
    assert_eq!(snapshot.session.last_event_id, None);
}
