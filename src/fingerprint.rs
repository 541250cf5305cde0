//! Block fingerprints
//!
//! Equal fingerprints are taken as proof that two blocks are identical.
//! SHA-1 is the default so the wire format matches the classic tool; BLAKE3
//! is available when both ends are this implementation.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Digest used for every block of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
	Sha1,
	Blake3,
}

impl Default for DigestAlgorithm {
	fn default() -> Self {
		DigestAlgorithm::Sha1
	}
}

impl DigestAlgorithm {
	/// Width of the hex rendering on the wire
	pub fn hex_len(self) -> usize {
		match self {
			DigestAlgorithm::Sha1 => 40,
			DigestAlgorithm::Blake3 => 64,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			DigestAlgorithm::Sha1 => "sha1",
			DigestAlgorithm::Blake3 => "blake3",
		}
	}
}

impl fmt::Display for DigestAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for DigestAlgorithm {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"sha1" => Ok(DigestAlgorithm::Sha1),
			"blake3" => Ok(DigestAlgorithm::Blake3),
			other => Err(format!("unknown digest '{}' (expected sha1 or blake3)", other)),
		}
	}
}

/// Lowercase hex digest of one block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
	pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
		let hex = match algorithm {
			DigestAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
			DigestAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
		};
		Fingerprint(hex)
	}

	/// Accept `text` only if it has the algorithm's width and is lowercase hex
	pub fn parse(algorithm: DigestAlgorithm, text: &str) -> Option<Self> {
		let valid = text.len() == algorithm.hex_len()
			&& text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
		if valid {
			Some(Fingerprint(text.to_string()))
		} else {
			None
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}


// vim: ts=4
