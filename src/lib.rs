//! # blocksync - Block-level synchronization of devices and large files
//!
//! blocksync makes a target store byte-identical to a source store of the
//! same size. Both sides hash fixed-size blocks and only the blocks whose
//! fingerprints differ cross the wire. The target can be on another host,
//! reached through ssh, and is rewritten in place.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blocksync::sync::sync;
//! use blocksync::SyncConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stats = sync(SyncConfig::default(), "/dev/vg0/snap", "backup:/dev/sdb").await?;
//!     println!("same: {}, diff: {}", stats.same_blocks, stats.diff_blocks);
//!     Ok(())
//! }
//! ```
//!
//! ## Embedding the protocol
//!
//! [`engine::SyncSession`] and [`responder::Responder`] work over any
//! [`protocol::Transport`], e.g. the in-memory pair from
//! [`protocol::memory_pair`].

pub mod blocks;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod responder;
pub mod serve;
pub mod signals;
pub mod source;
pub mod store;
pub mod sync;

// Re-export commonly used types and functions
pub use config::SyncConfig;
pub use connection::Location;
pub use engine::{SessionOptions, SessionState, SyncEvent, SyncProgressCallback, SyncSession, SyncStats};
pub use error::{ConnectionError, Side, SyncError};
pub use fingerprint::{DigestAlgorithm, Fingerprint};
pub use responder::{Responder, ResponderState, ResponderStats, Role};
pub use sync::SyncBuilder;

// vim: ts=4
