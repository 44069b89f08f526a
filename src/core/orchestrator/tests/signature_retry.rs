use serde_json::json;

use super::{harness, persisted_turn, server_error, signature_rejection, text_reply, tool_call_reply};
use crate::core::llm::{Part, ProviderError, Role};
use crate::core::orchestrator::history::DUMMY_SIGNATURE;
use crate::core::orchestrator::types::{
    EngineError, ToolCallRecord, ToolResponseRecord, ToolTrace,
};

fn seeded_trace() -> ToolTrace {
    ToolTrace {
        calls: vec![ToolCallRecord {
            name: "task.manage".to_string(),
            args: json!({"action": "create", "title": "Report"}),
        }],
        responses: vec![ToolResponseRecord {
            name: "task.manage".to_string(),
            response: json!({"title": "Report", "status": "todo"}),
        }],
    }
}

fn model_signature(transcript: &[crate::core::llm::Content]) -> Option<Vec<u8>> {
    transcript
        .iter()
        .filter(|c| c.role == Role::Model)
        .flat_map(|c| c.parts.iter())
        .find_map(|p| match p {
            Part::Signature(sig) => Some(sig.clone()),
            _ => None,
        })
}

#[tokio::test]
async fn rejection_triggers_one_replay_with_placeholder_signatures() {
    let h = harness(vec![signature_rejection(), text_reply("All good now.")]);
    h.store
        .append_turn(&persisted_turn(
            h.user_id,
            h.conversation_id,
            "create a task",
            "Created.",
            seeded_trace(),
            Some(b"stored-signature".to_vec()),
        ))
        .await
        .expect("seed turn should persist");

    let outcome = h
        .engine
        .converse("what's on my list?", "", h.user_id, h.conversation_id)
        .await
        .expect("retry should recover the turn");
    assert_eq!(outcome.answer, "All good now.");
    assert_eq!(h.provider.request_count(), 2);

    // First attempt replayed the stored signature, the retry the placeholder
    assert_eq!(
        model_signature(&h.provider.transcript(0)),
        Some(b"stored-signature".to_vec())
    );
    assert_eq!(
        model_signature(&h.provider.transcript(1)),
        Some(DUMMY_SIGNATURE.to_vec())
    );
}

#[tokio::test]
async fn second_rejection_propagates() {
    let h = harness(vec![signature_rejection(), signature_rejection()]);
    h.store
        .append_turn(&persisted_turn(
            h.user_id,
            h.conversation_id,
            "create a task",
            "Created.",
            seeded_trace(),
            Some(b"stored-signature".to_vec()),
        ))
        .await
        .expect("seed turn should persist");

    let err = h
        .engine
        .converse("hello again", "", h.user_id, h.conversation_id)
        .await
        .expect_err("second rejection must not retry");
    assert!(matches!(
        err.error,
        EngineError::Provider(ProviderError::Api { status: 400, .. })
    ));
    assert_eq!(h.provider.request_count(), 2);
}

#[tokio::test]
async fn unrelated_provider_errors_do_not_retry() {
    let h = harness(vec![server_error()]);

    let err = h
        .engine
        .converse("hello", "", h.user_id, h.conversation_id)
        .await
        .expect_err("server errors propagate unmodified");
    assert!(matches!(
        err.error,
        EngineError::Provider(ProviderError::Api { status: 500, .. })
    ));
    assert_eq!(h.provider.request_count(), 1);
}

#[tokio::test]
async fn turn_limit_errors_do_not_retry() {
    let replies = (0..crate::core::orchestrator::MAX_TOOL_TURNS)
        .map(|_| tool_call_reply("task.manage", json!({"action": "list"}), None))
        .collect();
    let h = harness(replies);

    let err = h
        .engine
        .converse("loop", "", h.user_id, h.conversation_id)
        .await
        .expect_err("turn limit is terminal");
    assert!(matches!(err.error, EngineError::TurnLimitExceeded(_)));
    assert_eq!(
        h.provider.request_count(),
        crate::core::orchestrator::MAX_TOOL_TURNS
    );
}

/// A rejection midway through a turn restarts the whole sequence from
/// persisted history: the retry's trace contains only the retry's own
/// calls, while store effects of the abandoned attempt stand (each tool
/// invocation commits its own transaction).
#[tokio::test]
async fn mid_turn_rejection_replays_from_persisted_history_only() {
    let h = harness(vec![
        tool_call_reply(
            "task.manage",
            json!({"action": "create", "title": "Attempt one"}),
            Some(b"sig-a"),
        ),
        signature_rejection(),
        tool_call_reply(
            "task.manage",
            json!({"action": "create", "title": "Attempt two"}),
            Some(b"sig-b"),
        ),
        text_reply("Created."),
    ]);

    let outcome = h
        .engine
        .converse("create a task", "", h.user_id, h.conversation_id)
        .await
        .expect("retry should recover the turn");

    assert_eq!(outcome.trace.calls.len(), 1);
    assert_eq!(outcome.trace.calls[0].args["title"], json!("Attempt two"));
    assert_eq!(h.provider.request_count(), 4);

    // The retry's first request starts from persisted history only, with
    // no echo of the abandoned attempt's tool exchange.
    let retry_start = h.provider.transcript(2);
    assert_eq!(retry_start.len(), 1);
    assert_eq!(retry_start[0].role, Role::User);
}
