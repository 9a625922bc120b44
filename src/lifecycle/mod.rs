//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Ensure data root → Provision queues → Recover claims → Bind listener
//!
//! Shutdown:
//!     Signal received (signals.rs) → StopHandle::stop → Drain connections → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Claim recovery runs before the listener accepts traffic
//! - SIGINT, SIGTERM and SIGHUP all mean "stop"

pub mod signals;
pub mod startup;
