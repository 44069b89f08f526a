pub mod history;
pub mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::llm::{ChatProvider, Content, Part, ProviderError};
use crate::core::store::ChatStore;
use crate::core::tools::{self, ToolError};
use history::rebuild_transcript;
use types::{
    EngineError, ToolCallRecord, ToolResponseRecord, ToolTrace, TurnFailure, TurnOutcome,
};

/// Upper bound on provider exchanges within one turn.
pub const MAX_TOOL_TURNS: usize = 5;

/// Drives one user message through the bounded tool-calling loop against the
/// provider. Owns no global state: a fresh engine is built per request from
/// the store and the current provider handle.
pub struct ConversationEngine {
    store: Arc<ChatStore>,
    provider: Arc<dyn ChatProvider>,
    model: String,
}

impl ConversationEngine {
    pub fn new(store: Arc<ChatStore>, provider: Arc<dyn ChatProvider>, model: String) -> Self {
        Self {
            store,
            provider,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One user message to one final answer. When the provider rejects the
    /// replayed thought signatures, the transcript is rebuilt from scratch
    /// with placeholder signatures and the whole turn sequence replayed,
    /// exactly once. Any other failure, or a second rejection, propagates
    /// unchanged.
    pub async fn converse(
        &self,
        query: &str,
        context: &str,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<TurnOutcome, TurnFailure> {
        match self
            .run_turns(query, context, user_id, conversation_id, false)
            .await
        {
            Err(failure) if is_signature_rejection(&failure.error) => {
                warn!(
                    "Provider rejected stored thought signatures for conversation {}, \
                     replaying with placeholders",
                    conversation_id
                );
                self.run_turns(query, context, user_id, conversation_id, true)
                    .await
            }
            other => other,
        }
    }

    async fn run_turns(
        &self,
        query: &str,
        context: &str,
        user_id: Uuid,
        conversation_id: Uuid,
        use_dummy_signatures: bool,
    ) -> Result<TurnOutcome, TurnFailure> {
        let prior = self
            .store
            .turns_for_conversation(conversation_id, user_id)
            .await
            .map_err(TurnFailure::bare)?;
        let mut transcript = rebuild_transcript(&prior, use_dummy_signatures);
        transcript.push(Content::user(vec![Part::Text(compose_prompt(
            query, context,
        ))]));

        let declarations = tools::declarations();
        let mut trace = ToolTrace::default();
        let mut signature: Option<Vec<u8>> = None;

        for exchange in 0..MAX_TOOL_TURNS {
            let reply = match self
                .provider
                .generate(&self.model, &transcript, &declarations)
                .await
            {
                Ok(reply) => reply,
                Err(err) => {
                    return Err(TurnFailure {
                        error: err.into(),
                        trace,
                    });
                }
            };
            if reply.parts.is_empty() {
                return Err(TurnFailure {
                    error: EngineError::EmptyReply,
                    trace,
                });
            }

            let mut reply_signature: Option<Vec<u8>> = None;
            for part in &reply.parts {
                if let Part::Signature(sig) = part {
                    reply_signature = Some(sig.clone());
                }
            }
            if let Some(sig) = &reply_signature {
                // Last-write-wins across the turn's exchanges
                signature = Some(sig.clone());
            }

            // Only the first tool call of a reply is executed; the model
            // re-issues any further ones on the next exchange.
            let call = reply.parts.iter().find_map(|part| match part {
                Part::ToolCall { name, args } => Some((name.clone(), args.clone())),
                _ => None,
            });

            if let Some((name, args)) = call {
                info!(
                    "Exchange {}/{}: model invoked {}",
                    exchange + 1,
                    MAX_TOOL_TURNS,
                    name
                );
                trace.calls.push(ToolCallRecord {
                    name: name.clone(),
                    args: args.clone(),
                });
                let response = self
                    .dispatch_tool(&name, &args, user_id, conversation_id)
                    .await;
                trace.responses.push(ToolResponseRecord {
                    name: name.clone(),
                    response: response.clone(),
                });

                let mut model_parts = vec![Part::ToolCall { name: name.clone(), args }];
                if let Some(sig) = &reply_signature {
                    model_parts.push(Part::Signature(sig.clone()));
                }
                transcript.push(Content::model(model_parts));
                transcript.push(Content::tool(vec![Part::ToolResult { name, response }]));
                continue;
            }

            let answer: String = reply
                .parts
                .iter()
                .filter_map(|part| match part {
                    Part::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            if answer.trim().is_empty() {
                return Err(TurnFailure {
                    error: EngineError::EmptyReply,
                    trace,
                });
            }
            return Ok(TurnOutcome {
                answer,
                signature,
                trace,
            });
        }

        Err(TurnFailure {
            error: EngineError::TurnLimitExceeded(MAX_TOOL_TURNS),
            trace,
        })
    }

    /// Tool failures never abort the turn: every failure class becomes a
    /// structured result the model can read and react to. Argument and
    /// business-rule errors pass their message through; store-level errors
    /// are logged and replaced with a generic message.
    async fn dispatch_tool(
        &self,
        name: &str,
        args: &Value,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Value {
        if name != tools::TASK_TOOL {
            warn!("Model invoked undeclared tool '{}'", name);
            return json!({ "error": format!("unknown tool: {}", name) });
        }

        let parsed = match tools::parse_task_args(args.clone(), conversation_id) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("task.manage arguments rejected: {}", err);
                return json!({ "error": err.to_string() });
            }
        };

        match tools::tasks::run(&self.store, &parsed, user_id).await {
            Ok(value) => value,
            Err(ToolError::Backend(err)) => {
                error!("task.manage backend failure: {}", err);
                json!({ "error": "task tool failed unexpectedly, try again later" })
            }
            Err(err) => {
                warn!("task.manage refused: {}", err);
                json!({ "error": err.to_string() })
            }
        }
    }
}

fn is_signature_rejection(err: &EngineError) -> bool {
    match err {
        EngineError::Provider(ProviderError::Api { message, .. }) => {
            let message = message.to_lowercase();
            message.contains("thought_signature") || message.contains("thought signature")
        }
        _ => false,
    }
}

fn compose_prompt(query: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        "(no stored documents matched this question)"
    } else {
        context
    };
    format!(
        "You are a helpful, accurate assistant.\n\n\
         For knowledge questions, answer using ONLY the retrieved context below; \
         if the context does not contain enough information, say so clearly. \
         For anything concerning the user's personal tasks, use the task \
         management tool instead of answering from memory.\n\n\
         Context:\n{}\n\n\
         User question:\n{}",
        context, query
    )
}
