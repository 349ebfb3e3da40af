use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use netledger_core::error::StoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Metrics unavailable: {0}")]
    Metrics(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(_) | ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let message = self.to_string();

        tracing::error!("{}: {}", status, message);
        (status, Json(json!({ "error": message }))).into_response()
    }
}
