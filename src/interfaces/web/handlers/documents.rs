use axum::{Extension, Json, extract::State};
use serde::Deserialize;

use super::super::AppState;
use super::super::auth::AuthedUser;
use crate::core::retrieval::Retriever;

#[derive(Deserialize)]
pub struct UploadRequest {
    source: String,
    text: String,
}

pub async fn upload_endpoint(
    State(state): State<AppState>,
    Extension(user): Extension<AuthedUser>,
    Json(payload): Json<UploadRequest>,
) -> Json<serde_json::Value> {
    if payload.text.trim().is_empty() {
        return Json(serde_json::json!({
            "success": false, "error": "text must not be empty"
        }));
    }

    let provider = match state.chat_provider().await {
        Ok(provider) => provider,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };

    let retriever = Retriever::new(
        state.store.clone(),
        provider,
        state.config.embedding_model.clone(),
    );

    match retriever
        .add_document(user.user_id, &payload.source, &payload.text)
        .await
    {
        Ok(chunks) => Json(serde_json::json!({
            "success": true,
            "source": payload.source,
            "chunks_indexed": chunks,
        })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
