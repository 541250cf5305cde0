//! Sequential access to a block store (regular file or block device)

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs as afs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{Side, SyncError};
use crate::logging::*;

/// How a store is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
	ReadOnly,
	ReadWrite,
}

/// An open store with a forward-moving cursor
#[derive(Debug)]
pub struct Store {
	file: afs::File,
	path: PathBuf,
	side: Side,
	size: u64,
	position: u64,
}

impl Store {
	/// Open `path` and measure its size.
	///
	/// The size is found by seeking to the end, which also works for block
	/// devices whose metadata length is zero.
	pub async fn open(path: impl AsRef<Path>, mode: OpenMode, side: Side) -> Result<Self, SyncError> {
		let path = path.as_ref().to_path_buf();
		let access = |source: io::Error| SyncError::Access {
			side,
			path: path.display().to_string(),
			source,
		};

		let mut file = afs::OpenOptions::new()
			.read(true)
			.write(mode == OpenMode::ReadWrite)
			.open(&path)
			.await
			.map_err(access)?;

		let size = file.seek(SeekFrom::End(0)).await.map_err(access)?;
		file.seek(SeekFrom::Start(0)).await.map_err(access)?;

		debug!("Opened {} store {} ({} bytes, {:?})", side, path.display(), size, mode);
		Ok(Store { file, path, side, size, position: 0 })
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn side(&self) -> Side {
		self.side
	}

	/// Current cursor offset
	pub fn position(&self) -> u64 {
		self.position
	}

	/// Read up to `n` bytes. Fewer bytes are returned only at end of store.
	pub async fn read_block(&mut self, n: usize) -> Result<Vec<u8>, SyncError> {
		let mut buf = vec![0u8; n];
		let mut filled = 0;
		while filled < n {
			match self.file.read(&mut buf[filled..]).await {
				Ok(0) => break,
				Ok(read) => filled += read,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(self.access_error(e)),
			}
		}
		buf.truncate(filled);
		self.position += filled as u64;
		Ok(buf)
	}

	/// Overwrite the block that was just read.
	///
	/// Seeks back `block_len` bytes and writes `bytes` there, leaving the
	/// cursor right after the rewritten block so sequential reads continue.
	pub async fn write_block_in_place(&mut self, bytes: &[u8], block_len: usize) -> Result<(), SyncError> {
		if bytes.len() != block_len {
			return Err(self.access_error(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("replacement is {} bytes, block is {}", bytes.len(), block_len),
			)));
		}
		if block_len as u64 > self.position {
			return Err(self.access_error(io::Error::new(
				io::ErrorKind::InvalidInput,
				"cannot seek before start of store",
			)));
		}

		let start = self.position - block_len as u64;
		if let Err(e) = self.rewrite(start, bytes).await {
			return Err(self.access_error(e));
		}
		Ok(())
	}

	async fn rewrite(&mut self, start: u64, bytes: &[u8]) -> io::Result<()> {
		self.file.seek(SeekFrom::Start(start)).await?;
		self.file.write_all(bytes).await?;
		self.file.flush().await
	}

	/// Flush written blocks to stable storage
	pub async fn sync(&mut self) -> Result<(), SyncError> {
		match self.file.sync_all().await {
			Ok(()) => Ok(()),
			Err(e) => Err(self.access_error(e)),
		}
	}

	fn access_error(&self, source: io::Error) -> SyncError {
		SyncError::Access { side: self.side, path: self.path.display().to_string(), source }
	}
}


// vim: ts=4
