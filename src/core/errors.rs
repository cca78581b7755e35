use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn unavailable<E: std::fmt::Display>(err: E) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }

    /// Transient upstream overload, eligible for retry with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::ServiceUnavailable(_) => true,
            ApiError::Internal(msg) => {
                let lowered = msg.to_lowercase();
                lowered.contains("503")
                    || lowered.contains("overloaded")
                    || lowered.contains("unavailable")
            }
            _ => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_detection_matches_upstream_overload() {
        assert!(ApiError::ServiceUnavailable("overloaded".into()).is_transient());
        assert!(ApiError::Internal("upstream returned 503".into()).is_transient());
        assert!(ApiError::Internal("model UNAVAILABLE".into()).is_transient());
        assert!(!ApiError::BadRequest("missing field".into()).is_transient());
        assert!(!ApiError::Internal("parse failure".into()).is_transient());
    }
}
