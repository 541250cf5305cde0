//! Responder entry point for `blocksync serve`
//!
//! The process serves one store on its stdin/stdout and exits when the
//! session ends. Diagnostics go to stderr only.

use std::path::Path;

use crate::error::SyncError;
use crate::fingerprint::DigestAlgorithm;
use crate::logging::*;
use crate::protocol::{StdioTransport, Transport};
use crate::responder::{Responder, ResponderStats, Role};

/// Serve the store at `path` in `role` over this process's stdio
pub async fn serve(
	path: &Path,
	role: Role,
	block_size: usize,
	digest: DigestAlgorithm,
) -> Result<ResponderStats, SyncError> {
	serve_on(StdioTransport::stdio(), path, role, block_size, digest).await
}

/// Serve the store at `path` on an arbitrary transport
pub async fn serve_on<T: Transport>(
	transport: T,
	path: &Path,
	role: Role,
	block_size: usize,
	digest: DigestAlgorithm,
) -> Result<ResponderStats, SyncError> {
	if block_size == 0 {
		return Err(SyncError::InvalidConfig { message: "block size must be positive".to_string() });
	}
	debug!("Serving {} as {} ({} byte blocks, {})", path.display(), role, block_size, digest);
	let responder = Responder::open(role, path, block_size, digest, transport).await?;
	responder.run().await
}


// vim: ts=4
