//! Startup orchestration.
//!
//! # Responsibilities
//! - Prepare the data root and configured queues
//! - Recover claims orphaned by a previous crash
//! - Bind the listener last, so traffic only arrives when storage is ready

use thiserror::Error;

use crate::config::BrokerConfig;
use crate::net::{GracefulListener, ListenerError};
use crate::storage::{QueueError, QueueName, QueueStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to prepare data directory: {0}")]
    DataDir(#[source] std::io::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Prepare storage: data root, configured queues, and crash recovery for every queue found.
pub async fn prepare_storage(config: &BrokerConfig) -> Result<QueueStore, StartupError> {
    let store = QueueStore::new(&config.storage.data_dir);
    store.ensure_root().await.map_err(StartupError::DataDir)?;

    for raw in &config.storage.queues {
        store.provision(&QueueName::parse(raw)?).await?;
    }

    let queues = store.queues().await.map_err(StartupError::DataDir)?;
    for queue in &queues {
        let report = store.recover(queue).await?;
        if report.restored > 0 || report.discarded > 0 {
            tracing::warn!(
                queue = %queue,
                restored = report.restored,
                discarded = report.discarded,
                "Recovered queue state left by an unclean shutdown"
            );
        }
    }

    tracing::info!(
        data_dir = ?store.root(),
        queues = queues.len(),
        "Storage ready"
    );
    Ok(store)
}

/// Prepare storage, then bind the listener.
pub async fn start(config: &BrokerConfig) -> Result<(QueueStore, GracefulListener), StartupError> {
    let store = prepare_storage(config).await?;
    let listener =
        GracefulListener::bind(config.daemon.bind_address(), config.daemon.poll_interval()).await?;
    Ok((store, listener))
}
