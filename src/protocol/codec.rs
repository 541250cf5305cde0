//! Typed message exchange on top of a [`Transport`]
//!
//! Raw lines are parsed into [`Message`] values here, so nothing above this
//! layer touches wire strings.

use super::error::ProtocolError;
use super::messages::{self, Message, Reply};
use super::transport::{ProtocolResult, Transport};
use crate::fingerprint::{DigestAlgorithm, Fingerprint};

pub async fn send_message<T: Transport + ?Sized>(
	transport: &mut T,
	message: &Message,
) -> ProtocolResult<()> {
	transport.send_line(&message.to_string()).await
}

/// Read the SIZE announcement. A closed stream is an error here.
pub async fn recv_size<T: Transport + ?Sized>(transport: &mut T) -> ProtocolResult<u64> {
	match transport.read_line().await? {
		Some(line) => messages::parse_size(&line),
		None => Err(ProtocolError::UnexpectedEof { expected: "store size" }),
	}
}

/// Read the next block fingerprint, `None` once the peer has no more blocks
pub async fn recv_fingerprint<T: Transport + ?Sized>(
	transport: &mut T,
	algorithm: DigestAlgorithm,
) -> ProtocolResult<Option<Fingerprint>> {
	match transport.read_line().await? {
		Some(line) => messages::parse_fingerprint(algorithm, &line).map(Some),
		None => Ok(None),
	}
}

/// Read the driver's reply to a fingerprint, `None` if the driver hung up
pub async fn recv_reply<T: Transport + ?Sized>(transport: &mut T) -> ProtocolResult<Option<Reply>> {
	match transport.read_line().await? {
		Some(line) => messages::parse_reply(&line).map(Some),
		None => Ok(None),
	}
}

pub async fn send_block<T: Transport + ?Sized>(transport: &mut T, data: &[u8]) -> ProtocolResult<()> {
	transport.send_bytes(data).await
}

/// Read exactly `len` payload bytes; the length comes from block arithmetic
pub async fn recv_block<T: Transport + ?Sized>(
	transport: &mut T,
	len: usize,
) -> ProtocolResult<Vec<u8>> {
	transport.read_bytes(len).await
}


// vim: ts=4
