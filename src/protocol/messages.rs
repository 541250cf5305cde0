//! Typed wire messages
//!
//! The wire format is line oriented ASCII:
//!
//! ```text
//! responder -> driver   <size>\r\n                      once
//! responder -> driver   <hex fingerprint>\r\n           per block
//! driver -> responder   same\r\n | diff\r\n | abort\r\n per block
//! driver -> responder   <block_len raw bytes>           after diff (target role)
//! responder -> driver   <block_len raw bytes>           after diff (source role)
//! ```
//!
//! `abort` replaces a verdict, so it can only occur between two blocks.

use std::fmt;

use super::error::ProtocolError;
use crate::fingerprint::{DigestAlgorithm, Fingerprint};

/// Line terminator written by both endpoints
pub const EOL: &str = "\r\n";

/// Longest line either endpoint accepts, terminator included
pub const MAX_LINE_LEN: usize = 256;

pub const SAME: &str = "same";
pub const DIFF: &str = "diff";
pub const ABORT: &str = "abort";

/// Per-block decision taken by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	Same,
	Diff,
}

impl Verdict {
	pub fn token(self) -> &'static str {
		match self {
			Verdict::Same => SAME,
			Verdict::Diff => DIFF,
		}
	}
}

impl fmt::Display for Verdict {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.token())
	}
}

/// What a responder may receive where a verdict is expected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
	Verdict(Verdict),
	Abort,
}

/// Every line that travels on the endpoint stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
	Size(u64),
	Fingerprint(Fingerprint),
	Verdict(Verdict),
	Abort,
}

impl fmt::Display for Message {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Message::Size(size) => write!(f, "{}", size),
			Message::Fingerprint(fp) => f.write_str(fp.as_str()),
			Message::Verdict(v) => f.write_str(v.token()),
			Message::Abort => f.write_str(ABORT),
		}
	}
}

impl From<Reply> for Message {
	fn from(reply: Reply) -> Self {
		match reply {
			Reply::Verdict(v) => Message::Verdict(v),
			Reply::Abort => Message::Abort,
		}
	}
}

/// Parse a SIZE line (already stripped)
pub fn parse_size(line: &str) -> Result<u64, ProtocolError> {
	if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
		return Err(malformed("store size", line));
	}
	line.parse::<u64>().map_err(|_| malformed("store size", line))
}

/// Parse a FINGERPRINT line for the session's digest
pub fn parse_fingerprint(
	algorithm: DigestAlgorithm,
	line: &str,
) -> Result<Fingerprint, ProtocolError> {
	Fingerprint::parse(algorithm, line).ok_or_else(|| malformed("fingerprint", line))
}

/// Parse a VERDICT line
pub fn parse_reply(line: &str) -> Result<Reply, ProtocolError> {
	match line {
		SAME => Ok(Reply::Verdict(Verdict::Same)),
		DIFF => Ok(Reply::Verdict(Verdict::Diff)),
		ABORT => Ok(Reply::Abort),
		_ => Err(malformed("verdict", line)),
	}
}

fn malformed(expected: &'static str, line: &str) -> ProtocolError {
	ProtocolError::Malformed { expected, line: line.to_string() }
}


// vim: ts=4
