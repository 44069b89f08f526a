use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;
use uuid::Uuid;

use super::AppState;

/// Identity resolved by `require_auth`, available to handlers as a request
/// extension.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser {
    pub user_id: Uuid,
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let raw_token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    let raw_token = match raw_token {
        Some(t) => t,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Missing or invalid Authorization header. Use: Bearer <token>"
                })),
            )
                .into_response();
        }
    };

    match state.store.user_for_token(&raw_token).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(AuthedUser { user_id: user.id });
            next.run(req).await
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or unauthorized API token" })),
        )
            .into_response(),
        Err(e) => {
            error!("Token lookup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Token lookup failed" })),
            )
                .into_response()
        }
    }
}
