use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use tracing::{error, info};
use uuid::Uuid;

use crate::core::orchestrator::ConversationEngine;
use crate::core::orchestrator::types::{ToolTrace, TurnRecord, TurnStatus};
use crate::core::retrieval::Retriever;
use crate::core::store::ChatStore;

#[derive(Debug)]
pub struct ChatReply {
    pub answer: String,
    pub conversation_id: Uuid,
}

/// Run one inbound user message end to end: retrieval, then the engine,
/// then exactly one persisted turn row, written whatever happened, so the
/// audit trail never has gaps. A persistence failure is logged but never
/// overrides the result already computed for the user.
pub async fn handle_message(
    store: Arc<ChatStore>,
    engine: &ConversationEngine,
    retriever: &Retriever,
    top_k: usize,
    user_id: Uuid,
    message: &str,
    conversation_id: Option<Uuid>,
) -> Result<ChatReply> {
    let conversation_id = conversation_id.unwrap_or_else(Uuid::new_v4);
    let started = Instant::now();

    let result = match retriever.retrieve(message, top_k, user_id).await {
        Ok(context) => {
            engine
                .converse(message, &context, user_id, conversation_id)
                .await
                .map_err(|failure| (failure.error.to_string(), failure.trace))
        }
        Err(err) => Err((format!("retrieval failed: {}", err), ToolTrace::default())),
    };
    let latency_ms = started.elapsed().as_millis() as i64;

    let record = match &result {
        Ok(outcome) => TurnRecord {
            message_id: Uuid::new_v4(),
            user_id,
            conversation_id,
            user_message: message.to_string(),
            llm_response: Some(outcome.answer.clone()),
            thought_signature: outcome.signature.clone(),
            model_name: engine.model().to_string(),
            latency_ms,
            tool_trace: outcome.trace.clone(),
            error_message: None,
            status: TurnStatus::Completed,
        },
        Err((message_text, trace)) => TurnRecord {
            message_id: Uuid::new_v4(),
            user_id,
            conversation_id,
            user_message: message.to_string(),
            llm_response: None,
            thought_signature: None,
            model_name: engine.model().to_string(),
            latency_ms,
            tool_trace: trace.clone(),
            error_message: Some(message_text.clone()),
            status: TurnStatus::Error,
        },
    };

    if let Err(persist_err) = store.append_turn(&record).await {
        error!(
            "Failed to persist turn {} for conversation {}: {}",
            record.message_id, conversation_id, persist_err
        );
    }

    match result {
        Ok(outcome) => {
            info!(
                "Turn completed for conversation {} in {}ms ({} tool call(s))",
                conversation_id,
                latency_ms,
                outcome.trace.calls.len()
            );
            Ok(ChatReply {
                answer: outcome.answer,
                conversation_id,
            })
        }
        Err((message_text, _)) => Err(anyhow!(message_text)),
    }
}
