//! `ApiError` pairs an HTTP status with a wrapped `anyhow::Error` and
//! implements `IntoResponse`, so handlers return `Result<T, ApiError>`.
//! Malformed input maps to 400, missing resources to 404, and anything
//! internal to 500; an empty result set is never an error.

use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
#[error("status: {status}, error: {error}")]
pub struct ApiError {
    pub status: StatusCode,
    #[source]
    pub error: anyhow::Error,
}

impl ApiError {
    pub fn new(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(error: impl Into<anyhow::Error>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, anyhow::anyhow!("{what} not found"))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<indexer::Error> for ApiError {
    fn from(error: indexer::Error) -> Self {
        tracing::error!(?error, "API responding with query engine error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.into())
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = axum::Json(serde_json::json!({
            "error": format!("{:#}", self.error),
        }));
        (self.status, body).into_response()
    }
}
