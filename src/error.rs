//! Error types for blocksync operations

use std::error::Error;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::protocol::ProtocolError;

/// Which store of the session an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	Source,
	Target,
}

impl fmt::Display for Side {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Side::Source => write!(f, "source"),
			Side::Target => write!(f, "target"),
		}
	}
}

/// Main error type for sync operations
///
/// Every variant is fatal for the session. Nothing is retried and target
/// blocks written before the failure stay written.
#[derive(Debug)]
pub enum SyncError {
	/// A store could not be opened, read or written
	Access { side: Side, path: String, source: io::Error },

	/// Source and target report different sizes
	SizeMismatch { source_size: u64, target_size: u64 },

	/// A peer sent malformed data or stopped where a message was expected
	ProtocolDesync { block: u64, message: String },

	/// The endpoint transport failed (nested)
	Connection(ConnectionError),

	/// A peer did not answer in time
	Timeout { after: Duration },

	/// Session cancelled between two block iterations
	Aborted { block: u64 },

	/// Operation issued in a session state that does not allow it
	InvalidState { operation: &'static str, state: String },

	/// Location string cannot be parsed
	InvalidLocation { location: String, reason: String },

	/// Invalid configuration
	InvalidConfig { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Access { side, path, source } => {
				write!(f, "Cannot access {} store {}: {}", side, path, source)
			}
			SyncError::SizeMismatch { source_size, target_size } => {
				write!(f, "Size mismatch: source={} bytes, target={} bytes", source_size, target_size)
			}
			SyncError::ProtocolDesync { block, message } => {
				write!(f, "Protocol desynchronized at block {}: {}", block, message)
			}
			SyncError::Connection(e) => write!(f, "Connection error: {}", e),
			SyncError::Timeout { after } => {
				write!(f, "Peer did not respond within {}s", after.as_secs())
			}
			SyncError::Aborted { block } => write!(f, "Sync aborted before block {}", block),
			SyncError::InvalidState { operation, state } => {
				write!(f, "Cannot {} in session state {}", operation, state)
			}
			SyncError::InvalidLocation { location, reason } => {
				write!(f, "Invalid location '{}': {}", location, reason)
			}
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Access { source, .. } => Some(source),
			SyncError::Connection(e) => Some(e),
			_ => None,
		}
	}
}

impl From<ConnectionError> for SyncError {
	fn from(e: ConnectionError) -> Self {
		SyncError::Connection(e)
	}
}

impl SyncError {
	/// Map a protocol failure during the handshake (before any block)
	pub(crate) fn from_handshake(e: ProtocolError) -> Self {
		match e {
			ProtocolError::Timeout(after) => SyncError::Timeout { after },
			ProtocolError::Io(source) => {
				SyncError::Connection(ConnectionError::Disconnected { message: source.to_string() })
			}
			other => SyncError::Connection(ConnectionError::HandshakeFailed {
				message: other.to_string(),
			}),
		}
	}

	/// Map a protocol failure inside the block loop
	pub(crate) fn from_block(block: u64, e: ProtocolError) -> Self {
		match e {
			ProtocolError::Timeout(after) => SyncError::Timeout { after },
			ProtocolError::Io(source) if is_disconnect(&source) => {
				SyncError::Connection(ConnectionError::Disconnected { message: source.to_string() })
			}
			other => SyncError::ProtocolDesync { block, message: other.to_string() },
		}
	}

	/// Process exit code for this error. `Aborted` maps to 130; the binary
	/// uses 143 instead when SIGTERM caused the abort.
	pub fn exit_code(&self) -> i32 {
		match self {
			SyncError::Aborted { .. } => 130,
			SyncError::InvalidConfig { .. } | SyncError::InvalidLocation { .. } => 2,
			_ => 1,
		}
	}
}

fn is_disconnect(e: &io::Error) -> bool {
	matches!(
		e.kind(),
		io::ErrorKind::BrokenPipe
			| io::ErrorKind::ConnectionReset
			| io::ErrorKind::ConnectionAborted
			| io::ErrorKind::NotConnected
	)
}

/// Connection-specific errors
#[derive(Debug)]
pub enum ConnectionError {
	/// SSH connection failed
	SshFailed { host: String, source: io::Error },

	/// Subprocess spawn failed
	SpawnFailed { cmd: String, source: io::Error },

	/// Stdio unavailable
	StdioUnavailable { what: String },

	/// The peer never announced a usable store size
	HandshakeFailed { message: String },

	/// Connection dropped mid-session
	Disconnected { message: String },

	/// Endpoint process exited unsuccessfully
	RemoteFailed { location: String, status: String },
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::SshFailed { host, source } => {
				write!(f, "SSH connection to {} failed: {}", host, source)
			}
			ConnectionError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			ConnectionError::StdioUnavailable { what } => {
				write!(f, "Stdio unavailable: {}", what)
			}
			ConnectionError::HandshakeFailed { message } => {
				write!(f, "Handshake failed: {}", message)
			}
			ConnectionError::Disconnected { message } => {
				write!(f, "Connection disconnected: {}", message)
			}
			ConnectionError::RemoteFailed { location, status } => {
				write!(f, "Endpoint {} exited with {}", location, status)
			}
		}
	}
}

impl Error for ConnectionError {}


// vim: ts=4
