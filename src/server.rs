use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::workflow::Message;

#[derive(Clone)]
pub struct AppState {
    pub bridge: Bridge,
    /// Cancelled on shutdown; each request waits on a child of it.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .with_state(state)
}

/// Acknowledge a chat message through the workflow.
/// A client disconnect drops this future and stops waiting; the execution
/// itself runs to completion in the engine.
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<Message>, JsonRejection>,
) -> Response {
    let Json(msg) = match payload {
        Ok(msg) => msg,
        Err(rejection) => {
            tracing::debug!("rejected chat request: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!("unable to decode request: {}", rejection.body_text()),
                })),
            )
                .into_response();
        }
    };

    let cancel = state.shutdown.child_token();
    match state.bridge.dispatch(msg, &cancel).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(e)).into_response(),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
