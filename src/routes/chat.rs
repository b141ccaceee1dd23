//! Chat streaming endpoints
//!
//! `POST /chat` transforms the conversation, opens the upstream stream, and
//! relays it back as Server-Sent Events. `POST /chat/stop` cancels an
//! in-flight stream by the id exposed in the `X-Stream-Id` response header.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    error::AppError,
    registry::{StreamHandle, StreamRegistry},
    streaming, transform,
    types::ChatTurn,
    AppState,
};

/// Client chat request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    messages: Option<Vec<ChatTurn>>,
    /// Client-side bookkeeping only; accepted and ignored
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

/// Stream cancellation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequestBody {
    stream_id: String,
}

/// Stream cancellation confirmation
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub success: bool,
    pub message: String,
}

/// Handle a chat request and stream the model's reply back as SSE.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let body: ChatRequestBody = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;

    let messages = match body.messages {
        Some(messages) if !messages.is_empty() => messages,
        _ => return Err(AppError::BadRequest("Messages are required".to_string())),
    };

    info!(
        messages = messages.len(),
        images = body.images.len(),
        conversation_id = body.conversation_id.as_deref().unwrap_or("-"),
        "Processing chat request"
    );

    let request =
        transform::build_request(&state.config, &state.inliner, messages, &body.images).await;
    let upstream = state.upstream.chat_completions_stream(&request).await?;

    // Register before any data flows so the client can cancel mid-stream
    let stream_id = StreamRegistry::next_id();
    let token = CancellationToken::new();
    state
        .registry
        .register(stream_id.clone(), StreamHandle::with_abort(token.clone()));

    let relayed = streaming::relay(
        upstream.bytes_stream(),
        stream_id.clone(),
        state.registry.clone(),
        token,
    );

    info!(stream_id = %stream_id, "Streaming chat response started");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .header("X-Stream-Id", stream_id)
        .body(Body::from_stream(relayed))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}

/// Cancel an in-flight stream. Unknown ids report not-found; cancelling the
/// same stream twice is safe.
pub async fn stop_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StopRequestBody>,
) -> Result<Json<StopResponse>, AppError> {
    if state.registry.cancel(&body.stream_id) {
        info!(stream_id = %body.stream_id, "Stream stopped by client");
        Ok(Json(StopResponse {
            success: true,
            message: "Stream stopped".to_string(),
        }))
    } else {
        Err(AppError::StreamNotFound(body.stream_id))
    }
}
