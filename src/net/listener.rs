//! TCP listener with a graceful stop.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections and register them for tracking
//! - Observe the stop signal within a bounded poll interval
//! - Let `stop()` wait until every accepted connection has closed

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;

use super::connection::{ConnectionTracker, TrackedStream};

/// Default upper bound on how long one accept attempt blocks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),
    /// Stop was observed; the listening socket is closed.
    #[error("shutting down, listening socket closed")]
    Stopped,
    /// Accept failed for a reason other than the poll timeout.
    #[error("failed to accept: {0}")]
    Fatal(#[source] io::Error),
}

/// Lifecycle of a [`GracefulListener`]. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ListenerState {
    /// Accepting new connections.
    Listening,
    /// Stop requested; waiting for in-flight connections.
    Draining,
    /// Every connection accepted before the stop has closed.
    Closed,
}

impl ListenerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Listening,
            1 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    stop_tx: watch::Sender<bool>,
    tracker: ConnectionTracker,
}

impl Shared {
    fn advance(&self, from: ListenerState, to: ListenerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A TCP listener that can stop accepting on demand and drain.
///
/// `accept` never blocks longer than the poll interval without re-checking
/// the stop signal. A connection whose arrival overlaps the stop may be
/// dropped without being handed out.
#[derive(Debug)]
pub struct GracefulListener {
    inner: Option<TcpListener>,
    local_addr: SocketAddr,
    poll_interval: Duration,
    stop_rx: watch::Receiver<bool>,
    shared: Arc<Shared>,
}

impl GracefulListener {
    /// Bind to `addr`.
    pub async fn bind(addr: impl ToSocketAddrs, poll_interval: Duration) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        Self::from_listener(listener, poll_interval).map_err(ListenerError::Bind)
    }

    /// Wrap an already bound listener.
    pub fn from_listener(listener: TcpListener, poll_interval: Duration) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (stop_tx, stop_rx) = watch::channel(false);

        tracing::info!(
            address = %local_addr,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Listener bound"
        );

        Ok(Self {
            inner: Some(listener),
            local_addr,
            poll_interval,
            stop_rx,
            shared: Arc::new(Shared {
                state: AtomicU8::new(ListenerState::Listening as u8),
                stop_tx,
                tracker: ConnectionTracker::new(),
            }),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.shared.tracker
    }

    /// Handle used to stop this listener from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Accept the next connection.
    ///
    /// Returns [`ListenerError::Stopped`] once the stop signal has been
    /// observed; the socket is closed at that point and every later call
    /// fails the same way. Poll timeouts are absorbed.
    pub async fn accept(&mut self) -> Result<(TrackedStream, SocketAddr), ListenerError> {
        loop {
            if *self.stop_rx.borrow() {
                self.close_socket();
                return Err(ListenerError::Stopped);
            }

            let attempt = {
                let Some(listener) = self.inner.as_ref() else {
                    return Err(ListenerError::Stopped);
                };
                tokio::select! {
                    biased;
                    _ = self.stop_rx.changed() => None,
                    res = tokio::time::timeout(self.poll_interval, listener.accept()) => Some(res),
                }
            };

            match attempt {
                // Stop signalled or poll interval elapsed: re-check at the top.
                None | Some(Err(_)) => continue,
                Some(Ok(Ok((stream, addr)))) => {
                    let guard = self.shared.tracker.track();
                    if *self.stop_rx.borrow() {
                        tracing::debug!(peer_addr = %addr, "Dropping connection that raced the stop signal");
                        drop(stream);
                        drop(guard);
                        continue;
                    }
                    tracing::debug!(
                        peer_addr = %addr,
                        connection_id = %guard.id(),
                        in_flight = self.shared.tracker.active_count(),
                        "Connection accepted"
                    );
                    return Ok((TrackedStream::new(stream, guard), addr));
                }
                Some(Ok(Err(e))) => {
                    tracing::error!(error = %e, "Accept failed");
                    self.close_socket();
                    return Err(ListenerError::Fatal(e));
                }
            }
        }
    }

    fn close_socket(&mut self) {
        if self.inner.take().is_some() {
            tracing::info!(address = %self.local_addr, "Listening socket closed");
        }
    }
}

/// Cloneable handle that stops a [`GracefulListener`] and waits for drain.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn in_flight(&self) -> u64 {
        self.shared.tracker.active_count()
    }

    /// Receiver that flips to `true` when draining begins.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.stop_tx.subscribe()
    }

    /// Stop accepting and wait until every accepted connection has closed.
    ///
    /// Idempotent; concurrent and repeated calls all wait for the same drain.
    pub async fn stop(&self) {
        if self.shared.advance(ListenerState::Listening, ListenerState::Draining) {
            tracing::info!(in_flight = self.in_flight(), "Stop requested, draining connections");
            self.shared.stop_tx.send_replace(true);
        }

        self.shared.tracker.wait_idle().await;

        if self.shared.advance(ListenerState::Draining, ListenerState::Closed) {
            tracing::info!("All connections drained, listener closed");
        }
    }
}
