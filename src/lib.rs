//! Filesystem-backed multi-queue message broker.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client PUT/GET /queue/{name}
//!     ─────────────────────────────┐
//!                                  ▼
//!     ┌─────────────────┐   ┌─────────────┐   ┌──────────────────────┐
//!     │ net::Graceful   │──▶│ http server │──▶│ storage::QueueStore  │
//!     │ Listener        │   │ (axum)      │   │ <data_dir>/<queue>/  │
//!     └───────┬─────────┘   └─────────────┘   └──────────────────────┘
//!             │
//!     ┌───────▼─────────┐
//!     │ Connection      │  in-flight count gates Stop()
//!     │ Tracker         │
//!     └─────────────────┘
//! ```
//!
//! Each message is one file named by its enqueue time in nanoseconds.
//! Consumers claim a message by renaming it to a consumer-unique hidden
//! name, so two dequeues can never own the same message. Delivery is
//! at-least-once: the file is deleted only after the response carrying it
//! has been flushed to the connection's socket.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod storage;

pub use config::BrokerConfig;
pub use http::HttpServer;
pub use net::{GracefulListener, StopHandle};
pub use storage::{QueueError, QueueName, QueueStore};
