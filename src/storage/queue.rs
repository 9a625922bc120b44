//! Directory-per-queue message store with rename-based claims.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::message::{link_exclusive, restore_claim, CLAIM_PREFIX, PARTIAL_PREFIX};
use super::{ClaimedMessage, MessageId, QueueError, QueueName};

/// Names pulled from a directory listing per pass.
const LIST_BATCH: usize = 10;

/// Outcome of [`QueueStore::recover`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Orphaned claims put back into view.
    pub restored: usize,
    /// Incomplete staging files deleted.
    pub discarded: usize,
}

/// Filesystem-backed store holding one directory per queue under `root`.
///
/// Instances share nothing but the filesystem, so independent stores (for
/// example one per test) only need distinct roots.
#[derive(Debug, Clone)]
pub struct QueueStore {
    root: PathBuf,
}

impl QueueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn queue_dir(&self, queue: &QueueName) -> PathBuf {
        self.root.join(queue.as_str())
    }

    /// Create the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Create the directory backing `queue`.
    ///
    /// Queues are provisioned explicitly; `enqueue` never creates them.
    pub async fn provision(&self, queue: &QueueName) -> Result<(), QueueError> {
        fs::create_dir_all(self.queue_dir(queue))
            .await
            .map_err(|e| QueueError::unavailable(queue.as_str(), e))?;
        tracing::info!(queue = %queue, "Queue provisioned");
        Ok(())
    }

    /// Names of all provisioned queues.
    pub async fn queues(&self) -> io::Result<Vec<QueueName>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut queues = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(queue) = QueueName::parse(name) {
                    queues.push(queue);
                }
            }
        }
        Ok(queues)
    }

    /// Store `payload` as a new message in `queue`.
    ///
    /// The payload is written and synced to a hidden staging file first and
    /// only then linked under its identifier, so a message is never visible
    /// before its write has completed.
    pub async fn enqueue(&self, queue: &QueueName, payload: Bytes) -> Result<MessageId, QueueError> {
        let dir = self.queue_dir(queue);
        let unavailable = |e| QueueError::unavailable(queue.as_str(), e);

        let meta = fs::metadata(&dir).await.map_err(unavailable)?;
        if !meta.is_dir() {
            return Err(unavailable(io::Error::other("queue path is not a directory")));
        }

        let staging = dir.join(format!("{PARTIAL_PREFIX}{}", Uuid::new_v4().simple()));
        if let Err(e) = write_synced(&staging, &payload).await {
            let _ = fs::remove_file(&staging).await;
            return Err(unavailable(e));
        }

        let base = MessageId::from_clock();
        let published = {
            let dir = dir.clone();
            let staging = staging.clone();
            let base = base.clone();
            tokio::task::spawn_blocking(move || link_exclusive(&staging, &dir, base.as_str()))
                .await
                .map_err(io::Error::other)
                .and_then(|res| res)
        };

        if let Err(e) = fs::remove_file(&staging).await {
            tracing::warn!(queue = %queue, staging = ?staging, error = %e, "Failed to remove staging file");
        }

        match published {
            Ok(Some(id)) => {
                tracing::debug!(queue = %queue, message_id = %id, bytes = payload.len(), "Message enqueued");
                Ok(id)
            }
            Ok(None) => Err(QueueError::Conflict {
                queue: queue.to_string(),
                id: base.to_string(),
            }),
            Err(e) => Err(unavailable(e)),
        }
    }

    /// Claim and read one message from `queue`, or `None` if it is empty.
    ///
    /// Never waits on another consumer: a candidate that vanished or was
    /// claimed first is skipped. The returned message must be acknowledged
    /// once delivered; see [`ClaimedMessage`].
    pub async fn dequeue(&self, queue: &QueueName) -> Result<Option<ClaimedMessage>, QueueError> {
        let dir = self.queue_dir(queue);
        let consumer = Uuid::new_v4().simple().to_string();

        loop {
            let batch = list_batch(&dir)
                .await
                .map_err(|e| QueueError::unavailable(queue.as_str(), e))?;
            if batch.is_empty() {
                return Ok(None);
            }

            for name in batch {
                let claim_path = dir.join(format!("{CLAIM_PREFIX}{consumer}.{name}"));
                let task = {
                    let queue = queue.clone();
                    let dir = dir.clone();
                    let name = name.clone();
                    // Runs to completion even if this future is dropped; a
                    // claim nobody receives is dropped and thereby released.
                    tokio::task::spawn_blocking(move || claim_file(queue, dir, name, claim_path))
                };
                match task.await.map_err(io::Error::other).and_then(|res| res) {
                    Ok(Some(claimed)) => {
                        tracing::debug!(queue = %queue, message_id = %claimed.id(), "Message claimed");
                        return Ok(Some(claimed));
                    }
                    Ok(None) => {
                        tracing::trace!(queue = %queue, message_id = %name, "Candidate claimed elsewhere");
                    }
                    Err(e) => return Err(QueueError::unavailable(queue.as_str(), e)),
                }
            }
        }
    }

    /// Number of messages currently visible in `queue`.
    pub async fn depth(&self, queue: &QueueName) -> Result<usize, QueueError> {
        let unavailable = |e| QueueError::unavailable(queue.as_str(), e);
        let mut entries = fs::read_dir(self.queue_dir(queue)).await.map_err(unavailable)?;
        let mut depth = 0;
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            if is_message(&entry).await {
                depth += 1;
            }
        }
        Ok(depth)
    }

    /// Undo the effects of a crash: put orphaned claims back into view and
    /// delete incomplete staging files.
    ///
    /// Only safe while no consumer is active on this root.
    pub async fn recover(&self, queue: &QueueName) -> Result<RecoveryReport, QueueError> {
        let dir = self.queue_dir(queue);
        let unavailable = |e| QueueError::unavailable(queue.as_str(), e);
        let mut entries = fs::read_dir(&dir).await.map_err(unavailable)?;
        let mut report = RecoveryReport::default();

        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            if name.starts_with(PARTIAL_PREFIX) {
                fs::remove_file(entry.path()).await.map_err(unavailable)?;
                report.discarded += 1;
            } else if let Some(rest) = name.strip_prefix(CLAIM_PREFIX) {
                let Some((_consumer, id)) = rest.split_once('.') else {
                    tracing::warn!(queue = %queue, file = name, "Unrecognised claim file left in place");
                    continue;
                };
                let dir = dir.clone();
                let claim_path = entry.path();
                let id = id.to_string();
                let restored = tokio::task::spawn_blocking(move || restore_claim(&dir, &claim_path, &id))
                    .await
                    .map_err(io::Error::other)
                    .and_then(|res| res)
                    .map_err(unavailable)?;
                tracing::info!(queue = %queue, message_id = %restored, "Orphaned claim restored");
                report.restored += 1;
            }
        }

        Ok(report)
    }
}

/// Rename `name` to `claim_path` and read it back.
///
/// `None` when the candidate vanished or another consumer claimed it first.
fn claim_file(
    queue: QueueName,
    dir: PathBuf,
    name: String,
    claim_path: PathBuf,
) -> io::Result<Option<ClaimedMessage>> {
    match std::fs::rename(dir.join(&name), &claim_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    }

    let mut claimed = ClaimedMessage::new(queue, MessageId::from_file_name(name), dir, claim_path);
    // On read failure `claimed` drops here and the claim is released.
    let payload = std::fs::read(claimed.claim_path())?;
    claimed.set_payload(Bytes::from(payload));
    Ok(Some(claimed))
}

async fn write_synced(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(payload).await?;
    file.sync_all().await
}

async fn is_message(entry: &fs::DirEntry) -> bool {
    let visible = entry
        .file_name()
        .to_str()
        .is_some_and(|name| !name.starts_with('.'));
    visible && entry.file_type().await.is_ok_and(|t| t.is_file())
}

/// Up to [`LIST_BATCH`] deliverable names, in directory order.
async fn list_batch(dir: &Path) -> io::Result<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::with_capacity(LIST_BATCH);
    while names.len() < LIST_BATCH {
        let Some(entry) = entries.next_entry().await? else {
            break;
        };
        if !is_message(&entry).await {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    async fn store_with(queue: &str) -> (tempfile::TempDir, QueueStore, QueueName) {
        let root = tempfile::tempdir().unwrap();
        let store = QueueStore::new(root.path());
        let queue = QueueName::parse(queue).unwrap();
        store.provision(&queue).await.unwrap();
        (root, store, queue)
    }

    #[tokio::test]
    async fn round_trip_deletes_backing_file() {
        let (_root, store, queue) = store_with("jobs").await;

        let id = store.enqueue(&queue, Bytes::from_static(b"hello")).await.unwrap();
        let path = store.root().join("jobs").join(id.as_str());
        assert!(path.exists());

        let claimed = store.dequeue(&queue).await.unwrap().unwrap();
        assert_eq!(claimed.id(), &id);
        assert_eq!(claimed.payload().as_ref(), b"hello");
        assert!(!path.exists(), "claimed message must leave the visible set");

        claimed.acknowledge().await.unwrap();
        assert_eq!(std::fs::read_dir(store.root().join("jobs")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_queue_reports_none() {
        let (_root, store, queue) = store_with("jobs").await;
        assert!(store.dequeue(&queue).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_does_not_create_missing_queue() {
        let root = tempfile::tempdir().unwrap();
        let store = QueueStore::new(root.path());
        let queue = QueueName::parse("missing").unwrap();

        let err = store.enqueue(&queue, Bytes::from_static(b"x")).await.unwrap_err();

        assert!(matches!(err, QueueError::Unavailable { .. }));
        assert!(!root.path().join("missing").exists());
    }

    #[tokio::test]
    async fn dequeue_missing_queue_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let store = QueueStore::new(root.path());
        let queue = QueueName::parse("missing").unwrap();

        let err = store.dequeue(&queue).await.unwrap_err();
        assert!(err.is_retryable());
    }

    async fn wait_for_depth(store: &QueueStore, queue: &QueueName, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let depth = store.depth(queue).await.unwrap();
            if depth == expected {
                return;
            }
            assert!(Instant::now() < deadline, "depth stuck at {depth}, expected {expected}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn dropped_claim_returns_message() {
        let (_root, store, queue) = store_with("jobs").await;
        store.enqueue(&queue, Bytes::from_static(b"again")).await.unwrap();

        let claimed = store.dequeue(&queue).await.unwrap().unwrap();
        assert_eq!(store.depth(&queue).await.unwrap(), 0);
        drop(claimed);

        wait_for_depth(&store, &queue, 1).await;
        let again = store.dequeue(&queue).await.unwrap().unwrap();
        assert_eq!(again.payload().as_ref(), b"again");
        again.acknowledge().await.unwrap();
    }

    #[test]
    fn claim_dropped_outside_a_runtime_is_restored_inline() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (_root, store, queue) = runtime.block_on(store_with("jobs"));
        let claimed = runtime.block_on(async {
            store.enqueue(&queue, Bytes::from_static(b"p")).await.unwrap();
            store.dequeue(&queue).await.unwrap().unwrap()
        });

        drop(claimed);

        assert_eq!(runtime.block_on(store.depth(&queue)).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn aborted_dequeues_leave_message_deliverable() {
        let (_root, store, queue) = store_with("jobs").await;
        store.enqueue(&queue, Bytes::from_static(b"survivor")).await.unwrap();

        for round in 0..300u64 {
            let task = {
                let store = store.clone();
                let queue = queue.clone();
                tokio::spawn(async move { store.dequeue(&queue).await })
            };
            let abort_at = Instant::now() + Duration::from_micros(round * 37 % 300);
            while Instant::now() < abort_at {
                tokio::task::yield_now().await;
            }
            task.abort();
            // Either cancelled or finished; a finished claim drops unacknowledged.
            let _ = task.await;

            wait_for_depth(&store, &queue, 1).await;
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        wait_for_depth(&store, &queue, 1).await;
        let claimed = store.dequeue(&queue).await.unwrap().unwrap();
        assert_eq!(claimed.payload().as_ref(), b"survivor");
        claimed.acknowledge().await.unwrap();
    }

    #[tokio::test]
    async fn release_makes_message_visible() {
        let (_root, store, queue) = store_with("jobs").await;
        let id = store.enqueue(&queue, Bytes::from_static(b"p")).await.unwrap();

        let claimed = store.dequeue(&queue).await.unwrap().unwrap();
        let restored = claimed.release().await.unwrap();

        assert_eq!(restored, id);
        assert_eq!(store.depth(&queue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn hidden_entries_are_never_delivered() {
        let (root, store, queue) = store_with("jobs").await;
        let dir = root.path().join("jobs");
        std::fs::write(dir.join(".partial.abc"), b"half").unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();

        assert!(store.dequeue(&queue).await.unwrap().is_none());
        assert_eq!(store.depth(&queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn drains_more_than_one_batch() {
        let (_root, store, queue) = store_with("jobs").await;
        for i in 0..(LIST_BATCH * 2 + 3) {
            store.enqueue(&queue, Bytes::from(i.to_string())).await.unwrap();
        }

        let mut seen = Vec::new();
        while let Some(claimed) = store.dequeue(&queue).await.unwrap() {
            seen.push(String::from_utf8(claimed.payload().to_vec()).unwrap());
            claimed.acknowledge().await.unwrap();
        }

        seen.sort_by_key(|s| s.parse::<usize>().unwrap());
        let expected: Vec<_> = (0..(LIST_BATCH * 2 + 3)).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn recover_restores_claims_and_discards_partials() {
        let (root, store, queue) = store_with("jobs").await;
        let dir = root.path().join("jobs");
        std::fs::write(dir.join(".claim.deadbeef.100"), b"orphan").unwrap();
        std::fs::write(dir.join(".partial.cafe"), b"torn").unwrap();

        let report = store.recover(&queue).await.unwrap();

        assert_eq!(report, RecoveryReport { restored: 1, discarded: 1 });
        assert_eq!(std::fs::read(dir.join("100")).unwrap(), b"orphan");
        assert!(!dir.join(".partial.cafe").exists());
    }

    #[tokio::test]
    async fn queues_lists_provisioned_directories() {
        let (_root, store, _queue) = store_with("jobs").await;
        store.provision(&QueueName::parse("mail").unwrap()).await.unwrap();

        let mut names: Vec<_> = store
            .queues()
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["jobs", "mail"]);
    }
}
