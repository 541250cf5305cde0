//! Protocol error types
//!
//! Errors raised at the transport boundary. The engine maps them into
//! [`SyncError`](crate::error::SyncError) depending on the session phase.

use std::fmt;
use std::io;
use std::time::Duration;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error on the endpoint stream
	Io(io::Error),
	/// Read or write did not complete in time
	Timeout(Duration),
	/// Stream ended where a message was expected
	UnexpectedEof { expected: &'static str },
	/// Line does not parse as the expected message
	Malformed { expected: &'static str, line: String },
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::Timeout(after) => write!(f, "timed out after {:?}", after),
			ProtocolError::UnexpectedEof { expected } => {
				write!(f, "stream closed while expecting {}", expected)
			}
			ProtocolError::Malformed { expected, line } => {
				write!(f, "expected {}, got {:?}", expected, line)
			}
		}
	}
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

// vim: ts=4
