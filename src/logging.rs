//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Sync complete");
//! debug!("Endpoint command: {}", command);
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber.
///
/// Logs go to stderr: stdout of a responder is the protocol channel.
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// when `verbose` is on.
///
/// ```bash
/// RUST_LOG=blocksync::engine=debug blocksync sync disk.img backup:/dev/sdb
/// ```
pub fn init_tracing(verbose: bool) {
	let default_level = if verbose { "debug" } else { "info" };
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.try_init();
}

// vim: ts=4
