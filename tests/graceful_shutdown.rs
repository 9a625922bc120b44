//! Listener stop and connection draining.

use std::time::Duration;

use fsqueue::net::{GracefulListener, ListenerError, ListenerState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn test_stop_with_no_connections_returns_immediately() {
    let listener = GracefulListener::bind("127.0.0.1:0", Duration::from_secs(1))
        .await
        .unwrap();
    let stop = listener.stop_handle();

    tokio::time::timeout(Duration::from_millis(100), stop.stop())
        .await
        .expect("stop must not wait when nothing was accepted");
    assert_eq!(stop.state(), ListenerState::Closed);
}

#[tokio::test]
async fn test_stop_waits_for_every_in_flight_connection() {
    let mut listener = GracefulListener::bind("127.0.0.1:0", Duration::from_millis(50))
        .await
        .unwrap();
    let addr = listener.local_addr();
    let stop = listener.stop_handle();

    let mut clients = Vec::new();
    let mut accepted = Vec::new();
    for _ in 0..3 {
        clients.push(TcpStream::connect(addr).await.unwrap());
        accepted.push(listener.accept().await.unwrap().0);
    }
    assert_eq!(stop.in_flight(), 3);

    let stopper = {
        let stop = stop.clone();
        tokio::spawn(async move { stop.stop().await })
    };

    // New connections are no longer handed out.
    assert!(matches!(listener.accept().await, Err(ListenerError::Stopped)));

    for mut stream in accepted.drain(..2) {
        stream.close().await.unwrap();
        // Closing twice must not decrement twice.
        stream.close().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stop.in_flight(), 1);
    assert!(!stopper.is_finished(), "one connection is still open");
    assert_eq!(stop.state(), ListenerState::Draining);

    drop(accepted);
    tokio::time::timeout(Duration::from_secs(1), stopper)
        .await
        .expect("stop should return once drained")
        .unwrap();
    assert_eq!(stop.state(), ListenerState::Closed);
}

#[tokio::test]
async fn test_in_flight_request_completes_during_drain() {
    let broker = common::start_broker(&["jobs"]).await;

    // Start a request but hold back half of its body.
    let mut conn = TcpStream::connect(broker.addr).await.unwrap();
    conn.write_all(
        b"PUT /queue/jobs HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\nhello",
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.stop.in_flight(), 1);

    let stopper = {
        let stop = broker.stop.clone();
        tokio::spawn(async move { stop.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!stopper.is_finished(), "drain must wait for the open request");

    conn.write_all(b"world").await.unwrap();
    let mut response = Vec::new();
    conn.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");

    tokio::time::timeout(Duration::from_secs(2), stopper)
        .await
        .expect("stop should return after the request finished")
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), broker.server)
        .await
        .expect("server loop should exit after stop")
        .unwrap();
    assert!(result.is_ok());

    let stored: Vec<_> = std::fs::read_dir(broker.root.path().join("jobs"))
        .unwrap()
        .map(|e| std::fs::read(e.unwrap().path()).unwrap())
        .collect();
    assert_eq!(stored, vec![b"helloworld".to_vec()]);
}

#[tokio::test]
async fn test_idle_keep_alive_connections_close_on_stop() {
    let broker = common::start_broker(&["jobs"]).await;

    let mut conn = TcpStream::connect(broker.addr).await.unwrap();
    conn.write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut buf = [0u8; 512];
    let n = conn.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200"));

    // Connection is idle but kept alive; stop must still complete.
    tokio::time::timeout(Duration::from_secs(2), broker.stop.stop())
        .await
        .expect("idle keep-alive connection should be closed by drain");
    assert_eq!(broker.stop.in_flight(), 0);
}
