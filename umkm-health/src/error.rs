//! Error types for umkm-health.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Request body validation failures. Messages name the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid JSON body: {0}")]
    MalformedJson(String),

    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field '{0}' must be a number")]
    NotNumeric(&'static str),

    #[error("Field '{0}' must be a finite number")]
    NotFinite(&'static str),

    #[error("Field 'user_id' must be a string or an integer")]
    InvalidUserId,

    #[error("Missing required field: user_id (required when persistence is enabled)")]
    MissingUserId,
}

/// Service errors.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Failed to persist analysis: {0}")]
    PersistenceFailed(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PredictError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictError::Validation(_) => StatusCode::BAD_REQUEST,
            PredictError::NotFound(_) => StatusCode::NOT_FOUND,
            PredictError::ClassifierUnavailable(_)
            | PredictError::PersistenceFailed(_)
            | PredictError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PredictError::from(ValidationError::MissingField("total_equity"));
        assert_eq!(err.to_string(), "Missing required field: total_equity");

        let err = PredictError::ClassifierUnavailable("model file not found".into());
        assert_eq!(err.to_string(), "Classifier unavailable: model file not found");
    }

    #[test]
    fn test_error_into_response() {
        let response = PredictError::from(ValidationError::NotAnObject).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = PredictError::PersistenceFailed("disk full".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = PredictError::NotFound("no analysis".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
