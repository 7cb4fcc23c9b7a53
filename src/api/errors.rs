use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::attempts::AttemptError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(&'static str),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::AlreadyAttempted => {
                ApiError::Conflict("You have already attempted this subject".to_string())
            }
            AttemptError::InsufficientQuestions { .. } => ApiError::BadRequest(err.to_string()),
            AttemptError::InvalidOption(option) => {
                ApiError::BadRequest(format!("Invalid answer option: {option}"))
            }
            AttemptError::AttemptAlreadySubmitted => {
                ApiError::Conflict("Attempt has already been submitted".to_string())
            }
            AttemptError::QuestionNotInAttempt => {
                ApiError::BadRequest("Question does not belong to this attempt".to_string())
            }
            AttemptError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            AttemptError::Store(err) => ApiError::internal(err, "Storage operation failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => {
                let status = StatusCode::FORBIDDEN;
                (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response()
            }
            ApiError::BadRequest(message) => {
                let status = StatusCode::BAD_REQUEST;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::NotFound(message) => {
                let status = StatusCode::NOT_FOUND;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::Conflict(message) => {
                let status = StatusCode::CONFLICT;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::TooManyRequests(message) => {
                let status = StatusCode::TOO_MANY_REQUESTS;
                (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_errors_map_onto_the_http_taxonomy() {
        let already: ApiError = AttemptError::AlreadyAttempted.into();
        assert!(matches!(already, ApiError::Conflict(_)));

        let insufficient: ApiError =
            AttemptError::InsufficientQuestions { available: 39, required: 40 }.into();
        assert!(matches!(insufficient, ApiError::BadRequest(_)));

        let invalid: ApiError = AttemptError::InvalidOption("E".to_string()).into();
        assert!(matches!(invalid, ApiError::BadRequest(_)));

        let submitted: ApiError = AttemptError::AttemptAlreadySubmitted.into();
        assert!(matches!(submitted, ApiError::Conflict(_)));

        let missing: ApiError = AttemptError::NotFound("Attempt").into();
        assert!(matches!(missing, ApiError::NotFound(_)));
    }
}
