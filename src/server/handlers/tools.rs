use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::tools;

pub async fn list_tools() -> impl IntoResponse {
    Json(json!({ "tools": tools::registry() }))
}
