use axum::{ http::StatusCode, response::{ IntoResponse, Response }, Json };
use thiserror::Error;

use crate::llm::chat::ProviderError;
use crate::models::chat::ErrorBody;

/// Failures the relay endpoint reports before any streamed bytes.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")] Validation(String),
    #[error("API key is not configured")]
    Configuration,
    #[error(transparent)] Provider(#[from] ProviderError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Configuration | RelayError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let error = match self {
            RelayError::Validation(_) => "Invalid chat request",
            RelayError::Configuration => "Server configuration error",
            RelayError::Provider(_) => "Failed to process chat request",
        };
        ErrorBody { error: error.to_string(), message: self.to_string() }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
