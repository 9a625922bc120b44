use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};

use crate::http::delivery::{self, PendingDeliveries};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::storage::QueueName;

/// Header carrying the stored message identifier.
pub const X_MESSAGE_ID: &str = "x-message-id";

/// `PUT /queue/{name}`: store the request body as one message.
pub async fn enqueue(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let queue = match QueueName::parse(&name) {
        Ok(q) => q,
        Err(e) => return ApiError(e).into_response(),
    };

    match state.store.enqueue(&queue, body).await {
        Ok(id) => {
            metrics::record_enqueue(queue.as_str());
            (StatusCode::OK, [(X_MESSAGE_ID, id.to_string())], "OK").into_response()
        }
        Err(e) => {
            tracing::warn!(queue = %queue, error = %e, "Enqueue failed");
            metrics::record_storage_error(queue.as_str(), "enqueue");
            ApiError(e).into_response()
        }
    }
}

/// `GET /queue/{name}`: claim one message and stream it back.
///
/// The message is deleted only after the response has been flushed to the
/// connection's transport. If the response or connection is abandoned first,
/// the claim is released and the message is delivered again later.
pub async fn dequeue(
    State(state): State<AppState>,
    connection: Option<Extension<PendingDeliveries>>,
    Path(name): Path<String>,
) -> Response {
    let queue = match QueueName::parse(&name) {
        Ok(q) => q,
        Err(e) => return ApiError(e).into_response(),
    };

    match state.store.dequeue(&queue).await {
        Ok(Some(message)) => {
            let id = message.id().to_string();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::HeaderName::from_static(X_MESSAGE_ID), id),
                ],
                delivery::body(message, connection.map(|Extension(pending)| pending)),
            )
                .into_response()
        }
        Ok(None) => {
            metrics::record_empty(queue.as_str());
            (StatusCode::NOT_FOUND, "Queue empty").into_response()
        }
        Err(e) => {
            tracing::warn!(queue = %queue, error = %e, "Dequeue failed");
            metrics::record_storage_error(queue.as_str(), "dequeue");
            ApiError(e).into_response()
        }
    }
}
