//! JSON error responses.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use filemorph_core::{ConversionError, FailureKind, SchedulerError};
use serde::Serialize;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
    /// Tool diagnostics, when the tool itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An error ready to be rendered as a response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                kind: kind.into(),
                message: message.into(),
                detail: None,
            },
        }
    }

    /// Malformed or incomplete request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &str {
        &self.body.kind
    }
}

/// HTTP status for a conversion failure.
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::UnsupportedConversion => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::UnrecognizedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::Cancelled => StatusCode::CONFLICT,
        FailureKind::ToolError => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::MissingOutput => StatusCode::BAD_GATEWAY,
        FailureKind::ToolUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::Workspace | FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        let kind = err.kind();
        let detail = match &err {
            ConversionError::ToolError { stderr_tail, .. } if !stderr_tail.is_empty() => {
                Some(stderr_tail.clone())
            }
            _ => None,
        };
        Self {
            status: status_for(kind),
            body: ErrorResponse {
                kind: kind.as_str().to_string(),
                message: kind.user_message().to_string(),
                detail,
            },
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "job_not_found", err.to_string())
            }
            SchedulerError::AlreadyFinished { .. } => {
                Self::new(StatusCode::CONFLICT, "already_finished", err.to_string())
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "invalid_request"
        };
        Self::new(status, kind, err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_conversion_error_mapping() {
        let err = ApiError::from(ConversionError::Timeout {
            after: Duration::from_secs(300),
        });
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.body.message, FailureKind::Timeout.user_message());
    }

    #[test]
    fn test_tool_error_keeps_detail() {
        let err = ApiError::from(ConversionError::ToolError {
            exit_code: Some(1),
            stderr_tail: "<workdir>/input.md: bad header".to_string(),
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.body.detail.as_deref(),
            Some("<workdir>/input.md: bad header")
        );
    }
}
