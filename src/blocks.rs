//! Fixed-size block sequencing over a store

use crate::error::SyncError;
use crate::store::Store;

/// One block read from a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	pub index: u64,
	pub data: Vec<u8>,
}

impl Block {
	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

/// Number of blocks covering `size` bytes
pub fn block_count(size: u64, block_size: usize) -> u64 {
	let bs = block_size as u64;
	if bs == 0 {
		return 0;
	}
	size / bs + u64::from(size % bs != 0)
}

/// Length of block `index` in a store of `size` bytes, `None` past the end
pub fn block_len(index: u64, size: u64, block_size: usize) -> Option<usize> {
	let start = index.checked_mul(block_size as u64)?;
	if start >= size {
		return None;
	}
	Some((size - start).min(block_size as u64) as usize)
}

/// Lazy, forward-only walk over the blocks of a store.
///
/// The sequencer knows nothing about the store size: it ends when a read
/// returns no bytes. It cannot be restarted; take the store back with
/// [`into_store`](Self::into_store) and reopen it for a fresh pass.
#[derive(Debug)]
pub struct BlockSequencer {
	store: Store,
	block_size: usize,
	next_index: u64,
	exhausted: bool,
}

impl BlockSequencer {
	pub fn new(store: Store, block_size: usize) -> Self {
		assert!(block_size > 0, "block size must be positive");
		BlockSequencer { store, block_size, next_index: 0, exhausted: false }
	}

	pub async fn next(&mut self) -> Result<Option<Block>, SyncError> {
		if self.exhausted {
			return Ok(None);
		}
		let data = self.store.read_block(self.block_size).await?;
		if data.is_empty() {
			self.exhausted = true;
			return Ok(None);
		}
		let block = Block { index: self.next_index, data };
		self.next_index += 1;
		Ok(Some(block))
	}

	/// Index the next block will get
	pub fn next_index(&self) -> u64 {
		self.next_index
	}

	pub fn block_size(&self) -> usize {
		self.block_size
	}

	pub fn store(&self) -> &Store {
		&self.store
	}

	pub fn store_mut(&mut self) -> &mut Store {
		&mut self.store
	}

	pub fn into_store(self) -> Store {
		self.store
	}
}


// vim: ts=4
