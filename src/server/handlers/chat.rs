//! Streaming chat endpoint.
//!
//! The response body is a plain-text stream: a `thread_id:<id>` control
//! line, optionally one retrieval/comparison info line, then the generated
//! reply as incremental chunks.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::chat::TurnEvent;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    pub thread_id: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequestBody>,
) -> Result<Response, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let thread_id = payload
        .thread_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    tracing::info!(
        "Chat request - thread_id: {}, message length: {}",
        thread_id,
        payload.message.len()
    );

    let (tx, rx) = mpsc::channel::<TurnEvent>(32);
    let pipeline = state.pipeline.clone();
    let message = payload.message.clone();
    let turn_thread = thread_id.clone();
    tokio::spawn(async move {
        pipeline.run_turn(&turn_thread, &message, tx).await;
    });

    let body = Body::from_stream(
        ReceiverStream::new(rx)
            .filter_map(|event| async move { render_event(event) })
            .map(Ok::<_, Infallible>),
    );

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

fn render_event(event: TurnEvent) -> Option<String> {
    match event {
        TurnEvent::ThreadId(id) => Some(format!("thread_id:{}\n", id)),
        TurnEvent::RetrievalInfo(n) => Some(format!("RETRIEVAL_INFO:{} results\n", n)),
        TurnEvent::ComparisonInfo(n) => Some(format!("COMPARISON_INFO:{} products\n", n)),
        TurnEvent::Chunk(chunk) => Some(chunk),
        TurnEvent::Error(message) => Some(format!("\nERROR:{}\n", message)),
        TurnEvent::Done => None,
    }
}
