//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TrackedStream (from net::GracefulListener)
//!     → server.rs (hyper HTTP/1.1 connection, axum router, middleware)
//!     → queue.rs (PUT/GET /queue/{name} → QueueStore)
//!     → response.rs (QueueError → status code)
//!     → delivery.rs (claims acknowledged once the response is flushed)
//!     → Send to client
//! ```

pub mod delivery;
pub mod queue;
pub mod response;
pub mod server;

pub use delivery::{DeliveryStream, PendingDeliveries};
pub use response::ApiError;
pub use server::{AppState, HttpServer};
