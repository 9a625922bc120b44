//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use fsqueue::config::BrokerConfig;
use fsqueue::http::HttpServer;
use fsqueue::lifecycle::startup;
use fsqueue::net::{ListenerError, StopHandle};
use fsqueue::storage::QueueStore;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// A broker serving on an ephemeral local port with an isolated data root.
pub struct TestBroker {
    pub addr: SocketAddr,
    pub stop: StopHandle,
    pub store: QueueStore,
    pub server: JoinHandle<Result<(), ListenerError>>,
    pub root: TempDir,
}

impl TestBroker {
    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a broker with `queues` provisioned.
pub async fn start_broker(queues: &[&str]) -> TestBroker {
    let root = tempfile::tempdir().unwrap();

    let mut config = BrokerConfig::default();
    config.daemon.bind_host = "127.0.0.1".into();
    config.daemon.port = 0;
    config.daemon.poll_interval_ms = 50;
    config.storage.data_dir = root.path().to_path_buf();
    config.storage.queues = queues.iter().map(|q| q.to_string()).collect();

    let (store, listener) = startup::start(&config).await.unwrap();
    let addr = listener.local_addr();
    let stop = listener.stop_handle();
    let server = tokio::spawn(HttpServer::new(&config, store.clone()).run(listener));

    TestBroker {
        addr,
        stop,
        store,
        server,
        root,
    }
}

/// Client that opens a fresh connection per request.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Wait until the directory of `queue` holds `expected` entries, hidden
/// claim and staging files included.
#[allow(dead_code)]
pub async fn wait_for_entries(broker: &TestBroker, queue: &str, expected: usize) {
    let dir = broker.root.path().join(queue);
    let settled = tokio::time::timeout(Duration::from_secs(2), async {
        while std::fs::read_dir(&dir).unwrap().count() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "{queue} never reached {expected} entries");
}
