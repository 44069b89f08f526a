use super::types::TurnRecord;
use crate::core::llm::{Content, Part};

/// Placeholder signature the provider accepts in place of a stale or missing
/// thought signature (wire form is the base64 of these bytes).
pub const DUMMY_SIGNATURE: &[u8] = b"context_engineering_is_the_way_to_go";

/// Replay persisted turns into the transcript shape the provider consumes,
/// oldest first. Per turn: the user message; then, when the turn had tool
/// activity, one model entry holding every recorded call (each followed by
/// its signature part) and one tool entry holding the recorded responses in
/// call order; then the final answer when one was stored. Call/response
/// order must survive exactly: the provider rejects a tool call whose next
/// entry is not its matching response.
pub fn rebuild_transcript(turns: &[TurnRecord], use_dummy_signatures: bool) -> Vec<Content> {
    let mut transcript = Vec::new();

    for turn in turns {
        transcript.push(Content::user(vec![Part::Text(turn.user_message.clone())]));

        if !turn.tool_trace.calls.is_empty() {
            let mut call_parts = Vec::new();
            for call in &turn.tool_trace.calls {
                call_parts.push(Part::ToolCall {
                    name: call.name.clone(),
                    args: call.args.clone(),
                });
                // One signature column per turn; replayed for each call.
                let signature = if use_dummy_signatures {
                    DUMMY_SIGNATURE.to_vec()
                } else {
                    turn.thought_signature
                        .clone()
                        .unwrap_or_else(|| DUMMY_SIGNATURE.to_vec())
                };
                call_parts.push(Part::Signature(signature));
            }
            transcript.push(Content::model(call_parts));

            if !turn.tool_trace.responses.is_empty() {
                let response_parts = turn
                    .tool_trace
                    .responses
                    .iter()
                    .map(|r| Part::ToolResult {
                        name: r.name.clone(),
                        response: r.response.clone(),
                    })
                    .collect();
                transcript.push(Content::tool(response_parts));
            }
        }

        if let Some(answer) = &turn.llm_response
            && !answer.is_empty()
        {
            transcript.push(Content::model(vec![Part::Text(answer.clone())]));
        }
    }

    transcript
}
