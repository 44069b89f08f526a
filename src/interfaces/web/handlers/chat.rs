use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use uuid::Uuid;

use super::super::AppState;
use super::super::auth::AuthedUser;
use crate::core::orchestrator::ConversationEngine;
use crate::core::retrieval::Retriever;

#[derive(Deserialize)]
pub struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

pub async fn chat_endpoint(
    State(state): State<AppState>,
    Extension(user): Extension<AuthedUser>,
    Json(payload): Json<ChatRequest>,
) -> Json<serde_json::Value> {
    if payload.message.trim().is_empty() {
        return Json(serde_json::json!({
            "success": false, "error": "message must not be empty"
        }));
    }

    let conversation_id = match payload
        .conversation_id
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
    {
        Ok(id) => id,
        Err(_) => {
            return Json(serde_json::json!({
                "success": false, "error": "conversation_id is not a valid UUID"
            }));
        }
    };

    let provider = match state.chat_provider().await {
        Ok(provider) => provider,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };

    let engine = ConversationEngine::new(
        state.store.clone(),
        provider.clone(),
        state.config.chat_model.clone(),
    );
    let retriever = Retriever::new(
        state.store.clone(),
        provider,
        state.config.embedding_model.clone(),
    );

    match crate::core::chat::handle_message(
        state.store.clone(),
        &engine,
        &retriever,
        state.config.retrieval_top_k,
        user.user_id,
        &payload.message,
        conversation_id,
    )
    .await
    {
        Ok(reply) => Json(serde_json::json!({
            "success": true,
            "answer": reply.answer,
            "conversation_id": reply.conversation_id.to_string(),
        })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
