//! Tests for cortex-llm: request types, tier ladder, and the scripted engine

use cortex_core::{Message, Tier};
use cortex_llm::*;
use futures::StreamExt;
use std::time::Duration;

async fn collect_text(mut stream: GenerationStream) -> (String, Option<GenerationError>) {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(StreamDelta::Text(t)) => text.push_str(&t),
            Ok(StreamDelta::Done { .. }) => break,
            Ok(StreamDelta::Error(e)) => return (text, Some(GenerationError::StreamError(e))),
            Err(e) => return (text, Some(e)),
        }
    }
    (text, None)
}

// ===========================================================================
// GenerationRequest
// ===========================================================================

#[test]
fn generation_request_default() {
    let req = GenerationRequest::default();
    assert_eq!(req.tier, Tier(0));
    assert!(req.messages.is_empty());
    assert!(req.system.is_none());
    assert_eq!(req.max_tokens, Some(2048));
}

#[test]
fn for_tier_keeps_prompt() {
    let req = GenerationRequest {
        system: Some("You are Ada".into()),
        messages: vec![Message::user("hi")],
        ..Default::default()
    };
    let up = req.for_tier(Tier(2), "deep-large", 4096);
    assert_eq!(up.tier, Tier(2));
    assert_eq!(up.model, "deep-large");
    assert_eq!(up.max_tokens, Some(4096));
    assert_eq!(up.system.as_deref(), Some("You are Ada"));
    assert_eq!(up.messages.len(), 1);
}

// ===========================================================================
// TierLadder
// ===========================================================================

#[test]
fn default_ladder_has_three_rungs() {
    let ladder = TierLadder::default();
    assert_eq!(ladder.len(), 3);
    assert_eq!(ladder.top(), Tier(2));
    assert_eq!(ladder.spec(Tier(0)).name, "fast");
    assert_eq!(ladder.spec(Tier(9)).name, "deep");
    assert!(ladder.spec(Tier(2)).cost_weight > ladder.spec(Tier(1)).cost_weight);
}

#[test]
fn capability_fraction_spans_zero_to_one() {
    let ladder = TierLadder::default();
    assert_eq!(ladder.capability_fraction(Tier(0)), 0.0);
    assert_eq!(ladder.capability_fraction(Tier(1)), 0.5);
    assert_eq!(ladder.capability_fraction(Tier(2)), 1.0);
}

#[test]
fn tier_spec_serde() {
    let spec = TierSpec::new("fast", "m", 1.0, 512);
    let json = serde_json::to_string(&spec).unwrap();
    let back: TierSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(back, spec);
}

// ===========================================================================
// ScriptedEngine
// ===========================================================================

#[tokio::test]
async fn scripted_text_streams_in_chunks() {
    let engine = ScriptedEngine::constant(Script::Text("hello brave new world".into()))
        .with_words_per_chunk(2);
    let stream = engine.generate(GenerationRequest::default(), None).await.unwrap();
    let (text, err) = collect_text(stream).await;
    assert_eq!(text, "hello brave new world");
    assert!(err.is_none());
    assert_eq!(engine.call_count().await, 1);
}

#[tokio::test]
async fn scripted_per_tier_then_sequence_then_default() {
    let engine = ScriptedEngine::sequence(vec![Script::Text("shared".into())])
        .on_tier(Tier(1), vec![Script::Text("tier one".into())]);

    let req0 = GenerationRequest::default();
    let req1 = req0.for_tier(Tier(1), "m", 100);

    let (t, _) = collect_text(engine.generate(req1.clone(), None).await.unwrap()).await;
    assert_eq!(t, "tier one");
    let (t, _) = collect_text(engine.generate(req1, None).await.unwrap()).await;
    assert_eq!(t, "shared");
    let (t, _) = collect_text(engine.generate(req0, None).await.unwrap()).await;
    assert!(t.contains("sequence exhausted"));

    assert_eq!(engine.calls().await, vec![Tier(1), Tier(1), Tier(0)]);
}

#[tokio::test]
async fn scripted_echo_uses_last_user_message() {
    let engine = ScriptedEngine::constant(Script::Echo("Ada:".into()));
    let req = GenerationRequest {
        messages: vec![Message::user("first"), Message::assistant("x"), Message::user("second")],
        ..Default::default()
    };
    let (t, _) = collect_text(engine.generate(req, None).await.unwrap()).await;
    assert_eq!(t, "Ada: second");
}

#[tokio::test]
async fn scripted_reject_fails_before_streaming() {
    let engine = ScriptedEngine::constant(Script::Reject("backend down".into()));
    let result = engine.generate(GenerationRequest::default(), None).await;
    assert!(matches!(result, Err(GenerationError::RequestFailed(_))));
}

#[tokio::test]
async fn scripted_fail_after_yields_partial_then_error() {
    let engine = ScriptedEngine::constant(Script::FailAfter {
        text: "partial output".into(),
        error: "connection reset".into(),
    });
    let (t, err) = collect_text(engine.generate(GenerationRequest::default(), None).await.unwrap()).await;
    assert_eq!(t, "partial output");
    assert!(matches!(err, Some(GenerationError::StreamError(_))));
}

#[tokio::test]
async fn scripted_empty_produces_no_text() {
    let engine = ScriptedEngine::constant(Script::Empty);
    let (t, err) = collect_text(engine.generate(GenerationRequest::default(), None).await.unwrap()).await;
    assert!(t.is_empty());
    assert!(err.is_none());
}

#[tokio::test(start_paused = true)]
async fn scripted_cancellation_stops_stream() {
    let engine = ScriptedEngine::constant(Script::Text("a b c d e f g h".into()))
        .with_words_per_chunk(1)
        .with_chunk_delay(Duration::from_millis(10));
    let cancel = CancellationToken::new();
    let mut stream = engine
        .generate(GenerationRequest::default(), Some(cancel.clone()))
        .await
        .unwrap();

    let first = stream.next().await;
    assert!(matches!(first, Some(Ok(StreamDelta::Text(_)))));
    cancel.cancel();
    let next = stream.next().await;
    assert!(matches!(next, Some(Err(GenerationError::Cancelled))));
}

// ===========================================================================
// Error conversion
// ===========================================================================

#[test]
fn generation_error_converts_to_core_failure() {
    let core: cortex_core::Error = GenerationError::EmptyOutput.into();
    assert!(matches!(core, cortex_core::Error::GenerationFailure { .. }));
}
