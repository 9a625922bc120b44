//! Message identifiers and claimed messages.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use super::{QueueError, QueueName};

/// Prefix of a file owned by exactly one consumer.
pub(crate) const CLAIM_PREFIX: &str = ".claim.";
/// Prefix of a payload that is still being written.
pub(crate) const PARTIAL_PREFIX: &str = ".partial.";
/// Upper bound on `<nanos>-<n>` suffixes tried before giving up.
pub(crate) const MAX_DISAMBIGUATION: u32 = 1024;

/// Identifier of a stored message: the enqueue wall-clock time in nanoseconds
/// since the epoch, optionally followed by `-<n>` when that instant was taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub(crate) fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(nanos.to_string())
    }

    pub(crate) fn from_file_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File names tried, in order, when publishing under `base`.
pub(crate) fn candidate_names(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string())
        .chain((1..MAX_DISAMBIGUATION).map(move |n| format!("{base}-{n}")))
}

/// Hard-link `source` into `dir` under the first free candidate name.
///
/// Linking fails instead of replacing an existing entry, so a published
/// message can never overwrite another one. Returns `None` when every
/// candidate is taken.
pub(crate) fn link_exclusive(source: &Path, dir: &Path, base: &str) -> io::Result<Option<MessageId>> {
    for name in candidate_names(base) {
        match std::fs::hard_link(source, dir.join(&name)) {
            Ok(()) => return Ok(Some(MessageId(name))),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Put a claimed file back into view and drop the claim.
pub(crate) fn restore_claim(dir: &Path, claim_path: &Path, id: &str) -> io::Result<MessageId> {
    let restored = link_exclusive(claim_path, dir, id)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::AlreadyExists, "no free identifier to restore claim")
    })?;
    std::fs::remove_file(claim_path)?;
    Ok(restored)
}

/// A message exclusively owned by one consumer.
///
/// The backing file has been renamed to a consumer-unique claim name, so no
/// other `dequeue` can see it. Call [`acknowledge`](Self::acknowledge) once
/// the payload has been delivered. Dropping an unsettled claim puts the
/// message back into the queue; inside a tokio runtime that happens shortly
/// after the drop, on the blocking pool.
#[derive(Debug)]
pub struct ClaimedMessage {
    queue: QueueName,
    id: MessageId,
    payload: Bytes,
    dir: PathBuf,
    claim_path: PathBuf,
    settled: bool,
}

impl ClaimedMessage {
    pub(crate) fn new(queue: QueueName, id: MessageId, dir: PathBuf, claim_path: PathBuf) -> Self {
        Self {
            queue,
            id,
            payload: Bytes::new(),
            dir,
            claim_path,
            settled: false,
        }
    }

    pub(crate) fn claim_path(&self) -> &Path {
        &self.claim_path
    }

    pub(crate) fn set_payload(&mut self, payload: Bytes) {
        self.payload = payload;
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Delete the message for good.
    ///
    /// On failure the claim is released when `self` drops, so the message
    /// stays deliverable.
    pub async fn acknowledge(mut self) -> Result<(), QueueError> {
        tokio::fs::remove_file(&self.claim_path)
            .await
            .map_err(|e| QueueError::unavailable(self.queue.as_str(), e))?;
        self.settled = true;
        tracing::debug!(queue = %self.queue, message_id = %self.id, "Message acknowledged");
        Ok(())
    }

    /// Give the message back to the queue without consuming it.
    pub async fn release(mut self) -> Result<MessageId, QueueError> {
        self.settled = true;
        let dir = self.dir.clone();
        let claim_path = self.claim_path.clone();
        let id = self.id.as_str().to_string();

        let restored = tokio::task::spawn_blocking(move || restore_claim(&dir, &claim_path, &id))
            .await
            .map_err(io::Error::other)
            .and_then(|res| res)
            .map_err(|e| QueueError::unavailable(self.queue.as_str(), e))?;

        tracing::debug!(queue = %self.queue, message_id = %restored, "Claim released");
        Ok(restored)
    }
}

impl Drop for ClaimedMessage {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let queue = self.queue.clone();
        let id = std::mem::replace(&mut self.id, MessageId(String::new()));
        let dir = std::mem::take(&mut self.dir);
        let claim_path = std::mem::take(&mut self.claim_path);

        let restore = move || match restore_claim(&dir, &claim_path, id.as_str()) {
            Ok(restored) => {
                tracing::info!(queue = %queue, message_id = %restored, "Undelivered message returned to queue");
            }
            Err(e) => {
                tracing::warn!(
                    queue = %queue,
                    message_id = %id,
                    claim = ?claim_path,
                    error = %e,
                    "Failed to release claim; message will be restored on next startup recovery"
                );
            }
        };

        // Keep the link/unlink off async worker threads when a runtime is around.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(restore);
            }
            Err(_) => restore(),
        }
    }
}
