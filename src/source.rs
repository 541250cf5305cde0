//! Where the driver gets source blocks from
//!
//! A [`LocalSource`] reads a store opened in this process. A
//! [`RemoteSource`] talks to a responder running in the source role, which
//! sends fingerprints like a target does and answers `diff` with the block
//! bytes.

use async_trait::async_trait;
use std::path::Path;

use crate::blocks::{block_count, block_len, Block, BlockSequencer};
use crate::error::{Side, SyncError};
use crate::fingerprint::{DigestAlgorithm, Fingerprint};
use crate::protocol::{codec, Message, Transport, Verdict};
use crate::store::{OpenMode, Store};

/// Fingerprint of the source block currently under comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
	pub index: u64,
	pub fingerprint: Fingerprint,
}

/// Source of blocks for a sync session
#[async_trait]
pub trait BlockSource: Send {
	/// Total store size in bytes
	fn size(&self) -> u64;

	/// Human readable name for diagnostics
	fn describe(&self) -> String;

	/// Advance to the next block. `None` once the source is exhausted.
	async fn next_fingerprint(&mut self) -> Result<Option<SourceBlock>, SyncError>;

	/// Settle the current block. Returns its bytes when the verdict is `Diff`.
	async fn resolve(&mut self, verdict: Verdict) -> Result<Option<Vec<u8>>, SyncError>;

	/// Tell the source the session is over (between blocks only)
	async fn abort(&mut self) -> Result<(), SyncError>;
}

/// Source store opened locally
pub struct LocalSource {
	blocks: BlockSequencer,
	algorithm: DigestAlgorithm,
	pending: Option<Block>,
}

impl LocalSource {
	pub async fn open(
		path: impl AsRef<Path>,
		block_size: usize,
		algorithm: DigestAlgorithm,
	) -> Result<Self, SyncError> {
		let store = Store::open(path, OpenMode::ReadOnly, Side::Source).await?;
		Ok(Self::new(store, block_size, algorithm))
	}

	pub fn new(store: Store, block_size: usize, algorithm: DigestAlgorithm) -> Self {
		LocalSource { blocks: BlockSequencer::new(store, block_size), algorithm, pending: None }
	}
}

#[async_trait]
impl BlockSource for LocalSource {
	fn size(&self) -> u64 {
		self.blocks.store().size()
	}

	fn describe(&self) -> String {
		self.blocks.store().path().display().to_string()
	}

	async fn next_fingerprint(&mut self) -> Result<Option<SourceBlock>, SyncError> {
		let block = match self.blocks.next().await? {
			Some(block) => block,
			None => return Ok(None),
		};
		let current = SourceBlock {
			index: block.index,
			fingerprint: Fingerprint::compute(self.algorithm, &block.data),
		};
		self.pending = Some(block);
		Ok(Some(current))
	}

	async fn resolve(&mut self, verdict: Verdict) -> Result<Option<Vec<u8>>, SyncError> {
		let block = self.pending.take().ok_or_else(|| SyncError::InvalidState {
			operation: "resolve a source block",
			state: "no block pending".to_string(),
		})?;
		match verdict {
			Verdict::Same => Ok(None),
			Verdict::Diff => Ok(Some(block.data)),
		}
	}

	async fn abort(&mut self) -> Result<(), SyncError> {
		self.pending = None;
		Ok(())
	}
}

/// Source store served by a responder in the source role
pub struct RemoteSource<T> {
	transport: T,
	location: String,
	size: u64,
	block_size: usize,
	algorithm: DigestAlgorithm,
	next_index: u64,
	pending: Option<u64>,
}

impl<T: Transport> RemoteSource<T> {
	/// Read the source responder's size announcement
	pub async fn connect(
		mut transport: T,
		location: impl Into<String>,
		block_size: usize,
		algorithm: DigestAlgorithm,
	) -> Result<Self, SyncError> {
		let size = codec::recv_size(&mut transport).await.map_err(SyncError::from_handshake)?;
		Ok(RemoteSource {
			transport,
			location: location.into(),
			size,
			block_size,
			algorithm,
			next_index: 0,
			pending: None,
		})
	}

	pub fn into_transport(self) -> T {
		self.transport
	}
}

#[async_trait]
impl<T: Transport> BlockSource for RemoteSource<T> {
	fn size(&self) -> u64 {
		self.size
	}

	fn describe(&self) -> String {
		self.location.clone()
	}

	async fn next_fingerprint(&mut self) -> Result<Option<SourceBlock>, SyncError> {
		let index = self.next_index;
		let expected = block_count(self.size, self.block_size);
		let received = codec::recv_fingerprint(&mut self.transport, self.algorithm)
			.await
			.map_err(|e| SyncError::from_block(index, e))?;

		match received {
			None if index < expected => Err(SyncError::ProtocolDesync {
				block: index,
				message: format!("source endpoint ended after {} of {} blocks", index, expected),
			}),
			None => Ok(None),
			Some(_) if index >= expected => Err(SyncError::ProtocolDesync {
				block: index,
				message: format!("source endpoint sent more than {} blocks", expected),
			}),
			Some(fingerprint) => {
				self.pending = Some(index);
				self.next_index += 1;
				Ok(Some(SourceBlock { index, fingerprint }))
			}
		}
	}

	async fn resolve(&mut self, verdict: Verdict) -> Result<Option<Vec<u8>>, SyncError> {
		let index = self.pending.take().ok_or_else(|| SyncError::InvalidState {
			operation: "resolve a source block",
			state: "no block pending".to_string(),
		})?;
		codec::send_message(&mut self.transport, &Message::Verdict(verdict))
			.await
			.map_err(|e| SyncError::from_block(index, e))?;
		if verdict == Verdict::Same {
			return Ok(None);
		}

		let len = block_len(index, self.size, self.block_size).ok_or_else(|| {
			SyncError::ProtocolDesync { block: index, message: "block index past end of store".to_string() }
		})?;
		let data = codec::recv_block(&mut self.transport, len)
			.await
			.map_err(|e| SyncError::from_block(index, e))?;
		Ok(Some(data))
	}

	async fn abort(&mut self) -> Result<(), SyncError> {
		let index = self.next_index;
		if self.pending.take().is_none() {
			// The responder is waiting with its next fingerprint written
			if index >= block_count(self.size, self.block_size) {
				return Ok(());
			}
			let announced = codec::recv_fingerprint(&mut self.transport, self.algorithm)
				.await
				.map_err(|e| SyncError::from_block(index, e))?;
			if announced.is_none() {
				return Ok(());
			}
		}
		codec::send_message(&mut self.transport, &Message::Abort)
			.await
			.map_err(|e| SyncError::from_block(index, e))
	}
}


// vim: ts=4
