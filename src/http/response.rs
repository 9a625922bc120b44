//! Response mapping.
//!
//! # Responsibilities
//! - Map storage errors to HTTP status codes
//! - Invite retry (`Retry-After`) on transient failures only
//!
//! # Mapping
//! - `Unavailable` → 503, `Conflict` → 409 (both retryable)
//! - `InvalidName` → 400 (do not retry verbatim)
//! - Empty queue is not an error; `queue.rs` answers it with 404

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::storage::QueueError;

/// Seconds a client should wait before retrying a transient failure.
const RETRY_AFTER_SECS: &str = "1";

/// A storage error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub QueueError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            QueueError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            QueueError::Conflict { .. } => StatusCode::CONFLICT,
            QueueError::InvalidName { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            QueueError::Unavailable { .. } => "Queue unavailable, retry later".to_string(),
            QueueError::Conflict { .. } => "Message identifier collision, retry".to_string(),
            QueueError::InvalidName { .. } => self.0.to_string(),
        };

        if self.0.is_retryable() {
            (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_invites_retry() {
        let err = ApiError(QueueError::Unavailable {
            queue: "jobs".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn invalid_name_is_client_error_without_retry() {
        let err = ApiError(QueueError::InvalidName {
            name: ".x".into(),
            reason: "must not start with '.'",
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ApiError(QueueError::Conflict {
            queue: "jobs".into(),
            id: "1".into(),
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
