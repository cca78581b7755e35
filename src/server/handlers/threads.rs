use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn get_thread_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .memory
        .history(&thread_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Thread not found".to_string()))?;

    Ok(Json(json!({
        "thread_id": thread_id,
        "messages": messages,
    })))
}
