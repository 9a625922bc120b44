//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, stop signal, periodic wake)
//!     → connection.rs (in-flight tracking, idempotent close)
//!     → Hand off to HTTP layer
//!
//! Listener States:
//!     Listening → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Stop is observed by the accept loop itself; the socket is dropped there
//! - Every accepted connection is tracked until its stream is closed or dropped
//! - A connection racing the stop signal may be dropped (documented limitation)

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, TrackedStream};
pub use listener::{GracefulListener, ListenerError, ListenerState, StopHandle};
