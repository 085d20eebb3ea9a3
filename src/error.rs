//! Error taxonomy for a single analysis request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::ErrorResponse;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Closed set of failure kinds a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Upload,
    RemoteProcessing,
    Timeout,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Remote processing failed: {0}")]
    RemoteProcessing(String),

    #[error("Timed out after {waited_secs:.1}s waiting for the video to become ready")]
    Timeout { waited_secs: f64 },

    #[error("Analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteProcessing(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Validation(_) => ErrorKind::Validation,
            AnalysisError::Upload(_) => ErrorKind::Upload,
            AnalysisError::RemoteProcessing(_) => ErrorKind::RemoteProcessing,
            AnalysisError::Timeout { .. } => ErrorKind::Timeout,
            AnalysisError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Validation failures are shown as warnings, everything else as an error.
    pub fn is_warning(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Message shown to the user.
    pub fn user_message(&self) -> String {
        if self.is_warning() {
            self.to_string()
        } else {
            format!("An error occurred during analysis: {}", self)
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Upload | ErrorKind::RemoteProcessing => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.user_message(),
            kind: self.kind(),
            warning: self.is_warning(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_a_warning_without_prefix() {
        let err = AnalysisError::validation("Please enter a question");
        assert!(err.is_warning());
        assert_eq!(err.user_message(), "Please enter a question");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn remote_failures_get_generic_prefix() {
        let err = AnalysisError::remote("quota exhausted");
        assert_eq!(err.kind(), ErrorKind::RemoteProcessing);
        assert_eq!(
            err.user_message(),
            "An error occurred during analysis: Remote processing failed: quota exhausted"
        );
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err = AnalysisError::Timeout { waited_secs: 12.0 };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
