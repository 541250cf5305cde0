//! Responder side of the protocol
//!
//! A responder walks its own store block by block, announces a fingerprint
//! for each block and waits for the driver's verdict before moving on:
//!
//! ```text
//! AwaitingSize --send size--> StreamingBlocks --store exhausted / abort--> Done
//!                                   ^      |
//!                                   +------+ fingerprint, verdict, [payload]
//! ```
//!
//! A target responder receives the payload and rewrites its block in place.
//! A source responder sends its own block as payload instead.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::blocks::{Block, BlockSequencer};
use crate::error::{Side, SyncError};
use crate::fingerprint::{DigestAlgorithm, Fingerprint};
use crate::logging::*;
use crate::protocol::{codec, Message, Reply, Transport, Verdict};
use crate::store::{OpenMode, Store};

/// Which store a responder serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Source,
	Target,
}

impl Role {
	pub fn side(self) -> Side {
		match self {
			Role::Source => Side::Source,
			Role::Target => Side::Target,
		}
	}

	pub fn open_mode(self) -> OpenMode {
		match self {
			Role::Source => OpenMode::ReadOnly,
			Role::Target => OpenMode::ReadWrite,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Role::Source => "source",
			Role::Target => "target",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"source" => Ok(Role::Source),
			"target" => Ok(Role::Target),
			other => Err(format!("unknown role '{}' (expected source or target)", other)),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
	AwaitingSize,
	StreamingBlocks,
	Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponderStats {
	pub same_blocks: u64,
	pub diff_blocks: u64,
	/// The driver ended the session with `abort`
	pub aborted: bool,
}

pub struct Responder<T> {
	role: Role,
	blocks: BlockSequencer,
	transport: T,
	algorithm: DigestAlgorithm,
	state: ResponderState,
	stats: ResponderStats,
}

impl<T: Transport> Responder<T> {
	pub fn new(
		role: Role,
		store: Store,
		block_size: usize,
		algorithm: DigestAlgorithm,
		transport: T,
	) -> Self {
		Responder {
			role,
			blocks: BlockSequencer::new(store, block_size),
			transport,
			algorithm,
			state: ResponderState::AwaitingSize,
			stats: ResponderStats::default(),
		}
	}

	/// Open the store for `role` and build a responder on it.
	///
	/// Nothing is sent when the store cannot be opened, so the driver sees
	/// the stream close without a size announcement.
	pub async fn open(
		role: Role,
		path: impl AsRef<Path>,
		block_size: usize,
		algorithm: DigestAlgorithm,
		transport: T,
	) -> Result<Self, SyncError> {
		let store = Store::open(path, role.open_mode(), role.side()).await?;
		Ok(Self::new(role, store, block_size, algorithm, transport))
	}

	pub fn role(&self) -> Role {
		self.role
	}

	pub fn state(&self) -> ResponderState {
		self.state
	}

	pub fn stats(&self) -> ResponderStats {
		self.stats
	}

	/// Perform one state transition and return the new state
	pub async fn step(&mut self) -> Result<ResponderState, SyncError> {
		match self.state {
			ResponderState::AwaitingSize => {
				let size = self.blocks.store().size();
				codec::send_message(&mut self.transport, &Message::Size(size))
					.await
					.map_err(SyncError::from_handshake)?;
				debug!("[{}] announced size {}", self.role, size);
				self.state = ResponderState::StreamingBlocks;
			}
			ResponderState::StreamingBlocks => self.stream_block().await?,
			ResponderState::Done => {}
		}
		Ok(self.state)
	}

	/// Drive the state machine to completion
	pub async fn run(mut self) -> Result<ResponderStats, SyncError> {
		while self.step().await? != ResponderState::Done {}
		info!(
			"[{}] done: {} same, {} diff{}",
			self.role,
			self.stats.same_blocks,
			self.stats.diff_blocks,
			if self.stats.aborted { " (aborted by driver)" } else { "" }
		);
		Ok(self.stats)
	}

	async fn stream_block(&mut self) -> Result<(), SyncError> {
		let block = match self.blocks.next().await? {
			Some(block) => block,
			None => return self.finish().await,
		};
		let index = block.index;

		let fingerprint = Fingerprint::compute(self.algorithm, &block.data);
		codec::send_message(&mut self.transport, &Message::Fingerprint(fingerprint))
			.await
			.map_err(|e| SyncError::from_block(index, e))?;

		let reply = codec::recv_reply(&mut self.transport)
			.await
			.map_err(|e| SyncError::from_block(index, e))?;
		match reply {
			None => Err(SyncError::ProtocolDesync {
				block: index,
				message: "driver closed the stream before sending a verdict".to_string(),
			}),
			Some(Reply::Abort) => {
				info!("[{}] driver aborted at block {}", self.role, index);
				self.stats.aborted = true;
				self.finish().await
			}
			Some(Reply::Verdict(Verdict::Same)) => {
				self.stats.same_blocks += 1;
				Ok(())
			}
			Some(Reply::Verdict(Verdict::Diff)) => {
				self.apply_diff(&block).await?;
				self.stats.diff_blocks += 1;
				Ok(())
			}
		}
	}

	async fn apply_diff(&mut self, block: &Block) -> Result<(), SyncError> {
		match self.role {
			Role::Target => {
				let data = codec::recv_block(&mut self.transport, block.len())
					.await
					.map_err(|e| SyncError::from_block(block.index, e))?;
				self.blocks.store_mut().write_block_in_place(&data, block.len()).await
			}
			Role::Source => codec::send_block(&mut self.transport, &block.data)
				.await
				.map_err(|e| SyncError::from_block(block.index, e)),
		}
	}

	async fn finish(&mut self) -> Result<(), SyncError> {
		if self.role == Role::Target && self.stats.diff_blocks > 0 {
			self.blocks.store_mut().sync().await?;
		}
		self.state = ResponderState::Done;
		Ok(())
	}
}


// vim: ts=4
