mod signature_retry;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::core::llm::{ChatProvider, Content, ModelReply, Part, ProviderError, ToolDeclaration};
use crate::core::orchestrator::ConversationEngine;
use crate::core::orchestrator::types::{ToolTrace, TurnRecord, TurnStatus};
use crate::core::store::{ChatStore, test_store};

/// Plays back a fixed sequence of replies and records every transcript it
/// was asked to extend, so tests can assert on exactly what the provider saw.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ModelReply, ProviderError>>>,
    pub transcripts: Mutex<Vec<Vec<Content>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<ModelReply, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.transcripts.lock().unwrap().len()
    }

    pub fn transcript(&self, index: usize) -> Vec<Content> {
        self.transcripts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn generate(
        &self,
        _model: &str,
        transcript: &[Content],
        _tools: &[ToolDeclaration],
    ) -> Result<ModelReply, ProviderError> {
        self.transcripts.lock().unwrap().push(transcript.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Payload("script exhausted".to_string())))
    }
}

pub fn text_reply(text: &str) -> Result<ModelReply, ProviderError> {
    Ok(ModelReply {
        parts: vec![Part::Text(text.to_string())],
    })
}

pub fn tool_call_reply(
    name: &str,
    args: Value,
    signature: Option<&[u8]>,
) -> Result<ModelReply, ProviderError> {
    let mut parts = vec![Part::ToolCall {
        name: name.to_string(),
        args,
    }];
    if let Some(sig) = signature {
        parts.push(Part::Signature(sig.to_vec()));
    }
    Ok(ModelReply { parts })
}

pub fn empty_reply() -> Result<ModelReply, ProviderError> {
    Ok(ModelReply::default())
}

pub fn signature_rejection() -> Result<ModelReply, ProviderError> {
    Err(ProviderError::Api {
        status: 400,
        message: "Invalid argument: the provided thought_signature does not match \
                  the conversation history."
            .to_string(),
    })
}

pub fn server_error() -> Result<ModelReply, ProviderError> {
    Err(ProviderError::Api {
        status: 500,
        message: "internal error".to_string(),
    })
}

pub struct Harness {
    pub _dir: tempfile::TempDir,
    pub store: Arc<ChatStore>,
    pub provider: Arc<ScriptedProvider>,
    pub engine: ConversationEngine,
    pub user_id: Uuid,
    pub conversation_id: Uuid,
}

pub fn harness(replies: Vec<Result<ModelReply, ProviderError>>) -> Harness {
    let (dir, store) = test_store();
    let provider = Arc::new(ScriptedProvider::new(replies));
    let engine = ConversationEngine::new(
        store.clone(),
        provider.clone(),
        "gemini-2.5-flash".to_string(),
    );
    Harness {
        _dir: dir,
        store,
        provider,
        engine,
        user_id: Uuid::new_v4(),
        conversation_id: Uuid::new_v4(),
    }
}

/// A completed prior turn with optional tool activity, for seeding history.
pub fn persisted_turn(
    user_id: Uuid,
    conversation_id: Uuid,
    message: &str,
    answer: &str,
    trace: ToolTrace,
    signature: Option<Vec<u8>>,
) -> TurnRecord {
    TurnRecord {
        message_id: Uuid::new_v4(),
        user_id,
        conversation_id,
        user_message: message.to_string(),
        llm_response: Some(answer.to_string()),
        thought_signature: signature,
        model_name: "gemini-2.5-flash".to_string(),
        latency_ms: 100,
        tool_trace: trace,
        error_message: None,
        status: TurnStatus::Completed,
    }
}
