//! Sync engine: the driver side of the protocol
//!
//! The driver owns the session. It checks that both stores have the same
//! size, then walks the source block by block, compares each source
//! fingerprint with the one the target responder reports for the same
//! index, and answers `same` or `diff`. A `diff` is followed immediately by
//! the raw source block.
//!
//! ```text
//! Handshake --sizes equal--> Comparing --source exhausted--> Done
//!     |                          |
//!     +-------- any error -------+------> Failed
//! ```

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::blocks::{block_count, block_len};
use crate::error::SyncError;
use crate::fingerprint::DigestAlgorithm;
use crate::logging::*;
use crate::protocol::{codec, Message, Transport, Verdict};
use crate::source::{BlockSource, LocalSource};

/// Default block size (1 MiB)
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Handshake,
	Comparing,
	Done,
	Failed,
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SessionState::Handshake => "handshake",
			SessionState::Comparing => "comparing",
			SessionState::Done => "done",
			SessionState::Failed => "failed",
		};
		f.write_str(name)
	}
}

/// Counters of a session, readable after success or failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
	/// Store size agreed at handshake
	pub size: u64,
	/// `ceil(size / block_size)`, for progress only
	pub expected_blocks: u64,
	pub same_blocks: u64,
	pub diff_blocks: u64,
	/// Payload bytes sent to the target
	pub bytes_transferred: u64,
	pub elapsed: Duration,
}

impl SyncStats {
	/// Blocks compared so far
	pub fn blocks(&self) -> u64 {
		self.same_blocks + self.diff_blocks
	}
}

/// Events emitted while a session runs
#[derive(Debug, Clone)]
pub enum SyncEvent {
	Started { size: u64, block_size: usize, expected_blocks: u64 },
	Block { index: u64, verdict: Verdict, stats: SyncStats },
	Finished(SyncStats),
}

/// Trait for receiving sync events
pub trait SyncProgressCallback: Send + Sync {
	fn on_event(&self, _event: SyncEvent) {}
}

impl<T: Fn(SyncEvent) + Send + Sync> SyncProgressCallback for T {
	fn on_event(&self, event: SyncEvent) {
		self(event);
	}
}

/// Parameters both endpoints must agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
	pub block_size: usize,
	pub digest: DigestAlgorithm,
}

impl Default for SessionOptions {
	fn default() -> Self {
		SessionOptions { block_size: DEFAULT_BLOCK_SIZE, digest: DigestAlgorithm::default() }
	}
}

impl SessionOptions {
	pub fn validate(&self) -> Result<(), SyncError> {
		if self.block_size == 0 {
			return Err(SyncError::InvalidConfig { message: "block size must be positive".to_string() });
		}
		Ok(())
	}
}

/// One sync between a block source and a target responder
pub struct SyncSession<S, T> {
	source: S,
	target: T,
	options: SessionOptions,
	state: SessionState,
	stats: SyncStats,
	next_index: u64,
	started: Option<Instant>,
	cancel: Option<Arc<AtomicBool>>,
	callback: Option<Arc<dyn SyncProgressCallback>>,
}

impl<S: BlockSource, T: Transport> SyncSession<S, T> {
	pub fn new(source: S, target: T, options: SessionOptions) -> Self {
		SyncSession {
			source,
			target,
			options,
			state: SessionState::Handshake,
			stats: SyncStats::default(),
			next_index: 0,
			started: None,
			cancel: None,
			callback: None,
		}
	}

	/// Abort between blocks once `flag` becomes true
	pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
		self.cancel = Some(flag);
		self
	}

	pub fn with_callback(mut self, callback: Arc<dyn SyncProgressCallback>) -> Self {
		self.callback = Some(callback);
		self
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn stats(&self) -> SyncStats {
		self.stats
	}

	/// Index of the next block to compare
	pub fn current_block(&self) -> u64 {
		self.next_index
	}

	pub fn into_parts(self) -> (S, T) {
		(self.source, self.target)
	}

	/// Read the target size and check it against the source.
	///
	/// On mismatch both peers get `abort` before any block is exchanged.
	pub async fn handshake(&mut self) -> Result<u64, SyncError> {
		self.guard(SessionState::Handshake, "handshake")?;
		let res = self.do_handshake().await;
		self.track(res)
	}

	/// Compare one block and return the resulting state
	pub async fn step(&mut self) -> Result<SessionState, SyncError> {
		self.guard(SessionState::Comparing, "compare blocks")?;
		let res = self.do_step().await;
		self.track(res)
	}

	/// Run the session to completion
	pub async fn run(&mut self) -> Result<SyncStats, SyncError> {
		if self.state == SessionState::Handshake {
			self.handshake().await?;
		}
		while self.step().await? == SessionState::Comparing {}
		Ok(self.stats)
	}

	fn guard(&self, expected: SessionState, operation: &'static str) -> Result<(), SyncError> {
		if self.state != expected {
			return Err(SyncError::InvalidState { operation, state: self.state.to_string() });
		}
		Ok(())
	}

	fn track<R>(&mut self, res: Result<R, SyncError>) -> Result<R, SyncError> {
		if let Err(e) = &res {
			self.state = SessionState::Failed;
			self.stamp_elapsed();
			warn!(
				"Sync failed at block {} ({} same, {} diff so far): {}",
				self.next_index, self.stats.same_blocks, self.stats.diff_blocks, e
			);
		}
		res
	}

	async fn do_handshake(&mut self) -> Result<u64, SyncError> {
		self.options.validate()?;
		self.started = Some(Instant::now());

		let source_size = self.source.size();
		let target_size =
			codec::recv_size(&mut self.target).await.map_err(SyncError::from_handshake)?;
		debug!("Source {} is {} bytes, target is {} bytes", self.source.describe(), source_size, target_size);

		if source_size != target_size {
			self.abort_peers().await;
			return Err(SyncError::SizeMismatch { source_size, target_size });
		}

		let expected_blocks = block_count(source_size, self.options.block_size);
		self.stats.size = source_size;
		self.stats.expected_blocks = expected_blocks;
		self.state = SessionState::Comparing;
		self.emit(SyncEvent::Started {
			size: source_size,
			block_size: self.options.block_size,
			expected_blocks,
		});
		Ok(source_size)
	}

	async fn do_step(&mut self) -> Result<SessionState, SyncError> {
		let index = self.next_index;
		if self.cancel.as_ref().map_or(false, |flag| flag.load(Ordering::SeqCst)) {
			self.abort_peers().await;
			return Err(SyncError::Aborted { block: index });
		}

		let source_block = match self.source.next_fingerprint().await? {
			Some(block) => block,
			None => return Ok(self.finish()),
		};
		if source_block.index != index {
			return Err(SyncError::ProtocolDesync {
				block: index,
				message: format!("source produced block {}", source_block.index),
			});
		}

		let target_fp = codec::recv_fingerprint(&mut self.target, self.options.digest)
			.await
			.map_err(|e| SyncError::from_block(index, e))?
			.ok_or_else(|| SyncError::ProtocolDesync {
				block: index,
				message: "target endpoint ended before sending a fingerprint".to_string(),
			})?;

		let verdict =
			if source_block.fingerprint == target_fp { Verdict::Same } else { Verdict::Diff };
		let payload = self.source.resolve(verdict).await?;

		match verdict {
			Verdict::Same => {
				codec::send_message(&mut self.target, &Message::Verdict(Verdict::Same))
					.await
					.map_err(|e| SyncError::from_block(index, e))?;
				self.stats.same_blocks += 1;
			}
			Verdict::Diff => {
				let data = payload.ok_or_else(|| SyncError::ProtocolDesync {
					block: index,
					message: "source returned no data for a differing block".to_string(),
				})?;
				let expected = block_len(index, self.stats.size, self.options.block_size);
				if expected != Some(data.len()) {
					return Err(SyncError::ProtocolDesync {
						block: index,
						message: format!("source block is {} bytes, expected {:?}", data.len(), expected),
					});
				}

				codec::send_message(&mut self.target, &Message::Verdict(Verdict::Diff))
					.await
					.map_err(|e| SyncError::from_block(index, e))?;
				codec::send_block(&mut self.target, &data)
					.await
					.map_err(|e| SyncError::from_block(index, e))?;
				self.stats.diff_blocks += 1;
				self.stats.bytes_transferred += data.len() as u64;
			}
		}

		self.next_index += 1;
		self.stamp_elapsed();
		self.emit(SyncEvent::Block { index, verdict, stats: self.stats });
		Ok(SessionState::Comparing)
	}

	fn finish(&mut self) -> SessionState {
		self.state = SessionState::Done;
		self.stamp_elapsed();
		info!(
			"Sync complete: {} same, {} diff, {} bytes sent in {:.1}s",
			self.stats.same_blocks,
			self.stats.diff_blocks,
			self.stats.bytes_transferred,
			self.stats.elapsed.as_secs_f64()
		);
		self.emit(SyncEvent::Finished(self.stats));
		SessionState::Done
	}

	/// Send `abort` in place of the next verdict. Peers may already be gone.
	///
	/// The target has already announced its next block (or closed its
	/// output); that line is read first so the responder never writes into
	/// a closed stream.
	async fn abort_peers(&mut self) {
		match codec::recv_fingerprint(&mut self.target, self.options.digest).await {
			Ok(Some(_)) => {
				let _ = codec::send_message(&mut self.target, &Message::Abort).await;
			}
			Ok(None) => debug!("Target already finished, not sending abort"),
			Err(e) => debug!("Target unreachable while aborting: {}", e),
		}
		if let Err(e) = self.source.abort().await {
			debug!("Source unreachable while aborting: {}", e);
		}
	}

	fn stamp_elapsed(&mut self) {
		if let Some(started) = self.started {
			self.stats.elapsed = started.elapsed();
		}
	}

	fn emit(&self, event: SyncEvent) {
		if let Some(cb) = &self.callback {
			cb.on_event(event);
		}
	}
}

/// Sync a local source store onto the responder behind `target`
pub async fn run<T: Transport>(
	source_path: impl AsRef<Path>,
	target: T,
	block_size: usize,
) -> Result<SyncStats, SyncError> {
	let options = SessionOptions { block_size, ..SessionOptions::default() };
	options.validate()?;
	let source = LocalSource::open(source_path, block_size, options.digest).await?;
	SyncSession::new(source, target, options).run().await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::memory_pair;
	use crate::responder::{Responder, Role};
	use std::fs;
	use std::sync::Mutex;
	use tempfile::TempDir;

	fn write(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
		let path = dir.path().join(name);
		fs::write(&path, content).unwrap();
		path
	}

	#[tokio::test]
	async fn test_step_before_handshake_is_rejected() {
		let dir = TempDir::new().unwrap();
		let src = write(&dir, "src.img", b"ABCD");
		let (ours, _theirs) = memory_pair(1024);
		let source = LocalSource::open(&src, 4, DigestAlgorithm::Sha1).await.unwrap();
		let mut session = SyncSession::new(source, ours, SessionOptions { block_size: 4, ..Default::default() });

		assert!(matches!(session.step().await, Err(SyncError::InvalidState { .. })));
		assert_eq!(session.state(), SessionState::Handshake);
	}

	#[tokio::test]
	async fn test_session_transitions() {
		let dir = TempDir::new().unwrap();
		let src = write(&dir, "src.img", b"ABCDEFGH");
		let tgt = write(&dir, "tgt.img", b"ABCDXXXX");

		let (ours, theirs) = memory_pair(64 * 1024);
		let responder = Responder::open(Role::Target, &tgt, 4, DigestAlgorithm::Sha1, theirs)
			.await
			.unwrap();
		let handle = tokio::spawn(responder.run());

		let source = LocalSource::open(&src, 4, DigestAlgorithm::Sha1).await.unwrap();
		let mut session = SyncSession::new(source, ours, SessionOptions { block_size: 4, ..Default::default() });

		assert_eq!(session.handshake().await.unwrap(), 8);
		assert_eq!(session.state(), SessionState::Comparing);
		assert!(matches!(session.handshake().await, Err(SyncError::InvalidState { .. })));

		assert_eq!(session.step().await.unwrap(), SessionState::Comparing);
		assert_eq!(session.stats().same_blocks, 1);
		assert_eq!(session.step().await.unwrap(), SessionState::Comparing);
		assert_eq!(session.stats().diff_blocks, 1);
		assert_eq!(session.step().await.unwrap(), SessionState::Done);
		assert_eq!(session.stats().bytes_transferred, 4);

		drop(session);
		handle.await.unwrap().unwrap();
		assert_eq!(fs::read(&tgt).unwrap(), b"ABCDEFGH".to_vec());
	}

	#[tokio::test]
	async fn test_cancel_flag_aborts_between_blocks() {
		let dir = TempDir::new().unwrap();
		let src = write(&dir, "src.img", b"AAAABBBBCCCC");
		let tgt = write(&dir, "tgt.img", b"XXXXXXXXXXXX");

		// Smaller than a fingerprint line, so the pending one has to be read
		let (ours, theirs) = memory_pair(16);
		let responder = Responder::open(Role::Target, &tgt, 4, DigestAlgorithm::Sha1, theirs)
			.await
			.unwrap();
		let handle = tokio::spawn(responder.run());

		let flag = Arc::new(AtomicBool::new(false));
		let source = LocalSource::open(&src, 4, DigestAlgorithm::Sha1).await.unwrap();
		let mut session = SyncSession::new(source, ours, SessionOptions { block_size: 4, ..Default::default() })
			.with_cancel_flag(flag.clone());

		session.handshake().await.unwrap();
		session.step().await.unwrap();
		flag.store(true, Ordering::SeqCst);
		match session.step().await {
			Err(SyncError::Aborted { block }) => assert_eq!(block, 1),
			other => panic!("unexpected result: {:?}", other),
		}
		assert_eq!(session.state(), SessionState::Failed);
		assert_eq!(session.stats().diff_blocks, 1);
		drop(session);

		let stats = handle.await.unwrap().unwrap();
		assert!(stats.aborted);
		assert_eq!(fs::read(&tgt).unwrap(), b"AAAAXXXXXXXX".to_vec());
	}

	#[tokio::test]
	async fn test_callback_sees_every_block() {
		let dir = TempDir::new().unwrap();
		let src = write(&dir, "src.img", b"0123456789");
		let tgt = write(&dir, "tgt.img", b"0123456789");

		let (ours, theirs) = memory_pair(64 * 1024);
		let responder = Responder::open(Role::Target, &tgt, 3, DigestAlgorithm::Sha1, theirs)
			.await
			.unwrap();
		let handle = tokio::spawn(responder.run());

		let events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();
		let source = LocalSource::open(&src, 3, DigestAlgorithm::Sha1).await.unwrap();
		let mut session = SyncSession::new(source, ours, SessionOptions { block_size: 3, ..Default::default() })
			.with_callback(Arc::new(move |event: SyncEvent| sink.lock().unwrap().push(event)));

		let stats = session.run().await.unwrap();
		handle.await.unwrap().unwrap();

		assert_eq!(stats.same_blocks, 4);
		let events = events.lock().unwrap();
		assert!(matches!(events[0], SyncEvent::Started { expected_blocks: 4, .. }));
		assert_eq!(events.iter().filter(|e| matches!(e, SyncEvent::Block { .. })).count(), 4);
		assert!(matches!(events.last(), Some(SyncEvent::Finished(_))));
	}

	#[tokio::test]
	async fn test_zero_block_size_rejected() {
		let dir = TempDir::new().unwrap();
		let src = write(&dir, "src.img", b"ABCD");
		let (ours, _theirs) = memory_pair(64);
		assert!(matches!(run(&src, ours, 0).await, Err(SyncError::InvalidConfig { .. })));
	}
}

// vim: ts=4
