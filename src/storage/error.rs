//! Error taxonomy for queue storage.

use thiserror::Error;

/// Errors returned by [`QueueStore`](super::QueueStore) operations.
///
/// An empty queue is not an error; `dequeue` reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue directory missing or unreadable, or a read/write failed.
    #[error("queue '{queue}' unavailable: {source}")]
    Unavailable {
        queue: String,
        #[source]
        source: std::io::Error,
    },

    /// Every disambiguated identifier for this timestamp was already taken.
    #[error("identifier collision in queue '{queue}' for message {id}")]
    Conflict { queue: String, id: String },

    /// Queue name is not a single well-formed path segment.
    #[error("invalid queue name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

impl QueueError {
    pub(crate) fn unavailable(queue: impl Into<String>, source: std::io::Error) -> Self {
        Self::Unavailable {
            queue: queue.into(),
            source,
        }
    }

    /// Whether the caller may retry the same request verbatim.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Conflict { .. } => true,
            Self::InvalidName { .. } => false,
        }
    }
}
