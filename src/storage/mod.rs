//! Filesystem-backed queue storage.
//!
//! # Data Flow
//! ```text
//! Enqueue:
//!     payload → .partial.<uuid> (create_new, fsync)
//!     → hard link to <nanos>[-n] (create-exclusive publish)
//!     → staging file removed
//!
//! Dequeue:
//!     read_dir in batches of 10 visible names
//!     → rename <id> → .claim.<uuid>.<id> (exactly one winner)
//!     → read payload → hand to transport → acknowledge (delete)
//! ```
//!
//! # Design Decisions
//! - One directory per queue; the directory listing is the index
//! - Hidden (`.`-prefixed) entries are internal and never delivered
//! - The claim rename is the only ownership primitive; listing order reserves nothing
//! - Respond-before-delete: an unsettled claim is released on drop (at-least-once)

pub mod error;
pub mod message;
pub mod name;
pub mod queue;

pub use error::QueueError;
pub use message::{ClaimedMessage, MessageId};
pub use name::QueueName;
pub use queue::{QueueStore, RecoveryReport};
