//! Chat routes: single-shot JSON and streamed `data:` frames.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use personachat_chat::{ChatRequest, FrameStream};
use personachat_core::ChatError;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream", post(stream_chat))
        .route("/chat/status", get(get_status))
}

// ---------------------------------------------------------------
// Status
// ---------------------------------------------------------------

async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.chat.status();
    Json(serde_json::json!({
        "defaultProvider": status.default_provider,
        "providers": status.providers,
        "personas": state.chat.personas(),
    }))
}

// ---------------------------------------------------------------
// Chat
// ---------------------------------------------------------------

/// `stream: true` in the body switches to streaming mode.
async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return bad_body(rejection),
    };

    if req.stream {
        return open_stream(&state, &req);
    }

    match state.chat.complete(&req).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn stream_chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(req)) => open_stream(&state, &req),
        Err(rejection) => bad_body(rejection),
    }
}

fn open_stream(state: &AppState, req: &ChatRequest) -> Response {
    match state.chat.stream(req) {
        Ok(frames) => stream_response(frames),
        Err(e) => error_response(&e),
    }
}

// ---------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------

/// Plain-text body of `data: {...}\n\n` frames.
fn stream_response(frames: FrameStream) -> Response {
    let body = frames.map(|frame| Ok::<_, Infallible>(Bytes::from(frame.to_sse())));
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

fn error_response(err: &ChatError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!("Chat request failed: {}", err);
    }
    (
        status,
        Json(serde_json::json!({ "error": err.user_message() })),
    )
        .into_response()
}

fn bad_body(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": format!("Invalid request body: {}", rejection.body_text()) })),
    )
        .into_response()
}
