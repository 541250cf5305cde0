//! Protocol scenario tests
//!
//! Runs a driver session against a responder over an in-process transport
//! and checks the resulting stores and counters. No processes are spawned.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use blocksync::blocks::block_count;
use blocksync::protocol::{codec, memory_pair, Message, Transport};
use blocksync::source::{LocalSource, RemoteSource};
use blocksync::{
	ConnectionError, DigestAlgorithm, Responder, ResponderStats, Role, SessionOptions, SessionState,
	SyncError, SyncSession, SyncStats,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn create_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
	let path = dir.join(name);
	fs::write(&path, content).unwrap();
	path
}

/// Deterministic pseudo-random bytes
fn noise(len: usize, seed: u32) -> Vec<u8> {
	let mut x = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
	(0..len)
		.map(|_| {
			x ^= x << 13;
			x ^= x >> 17;
			x ^= x << 5;
			(x >> 24) as u8
		})
		.collect()
}

fn options(block_size: usize, digest: DigestAlgorithm) -> SessionOptions {
	SessionOptions { block_size, digest }
}

/// Sync `src` onto `tgt` through a target responder on a memory transport
async fn sync_in_memory(
	src: &Path,
	tgt: &Path,
	opts: SessionOptions,
) -> (Result<SyncStats, SyncError>, Result<ResponderStats, SyncError>) {
	let (driver_side, responder_side) = memory_pair(256 * 1024);
	let responder = Responder::open(Role::Target, tgt, opts.block_size, opts.digest, responder_side)
		.await
		.unwrap();
	let handle = tokio::spawn(responder.run());

	let source = LocalSource::open(src, opts.block_size, opts.digest).await.unwrap();
	let mut session = SyncSession::new(source, driver_side, opts);
	let result = session.run().await;
	drop(session);

	(result, handle.await.unwrap())
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[tokio::test]
async fn test_one_same_one_diff_block() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"ABCDEFGH");
	let tgt = create_file(dir.path(), "tgt.img", b"ABCDXXXX");

	let (driver, responder) = sync_in_memory(&src, &tgt, options(4, DigestAlgorithm::Sha1)).await;
	let stats = driver.unwrap();

	assert_eq!(stats.same_blocks, 1);
	assert_eq!(stats.diff_blocks, 1);
	assert_eq!(stats.bytes_transferred, 4);
	assert_eq!(responder.unwrap(), ResponderStats { same_blocks: 1, diff_blocks: 1, aborted: false });
	assert_eq!(fs::read(&tgt).unwrap(), b"ABCDEFGH".to_vec());
}

#[tokio::test]
async fn test_size_mismatch_leaves_target_untouched() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", &noise(10, 1));
	let original = noise(12, 2);
	let tgt = create_file(dir.path(), "tgt.img", &original);

	let (driver, responder) = sync_in_memory(&src, &tgt, options(4, DigestAlgorithm::Sha1)).await;

	match driver {
		Err(SyncError::SizeMismatch { source_size, target_size }) => {
			assert_eq!(source_size, 10);
			assert_eq!(target_size, 12);
		}
		other => panic!("expected size mismatch, got {:?}", other),
	}
	let responder = responder.unwrap();
	assert!(responder.aborted);
	assert_eq!(responder.diff_blocks, 0);
	assert_eq!(fs::read(&tgt).unwrap(), original);
}

#[tokio::test]
async fn test_endpoint_exits_before_first_fingerprint() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"ABCDEFGH");

	let (driver_side, mut fake_target) = memory_pair(4096);
	codec::send_message(&mut fake_target, &Message::Size(8)).await.unwrap();
	drop(fake_target);

	let source = LocalSource::open(&src, 4, DigestAlgorithm::Sha1).await.unwrap();
	let mut session = SyncSession::new(source, driver_side, options(4, DigestAlgorithm::Sha1));

	match session.run().await {
		Err(SyncError::ProtocolDesync { block, .. }) => assert_eq!(block, 0),
		other => panic!("expected desync, got {:?}", other),
	}
	assert_eq!(session.state(), SessionState::Failed);
	assert_eq!(session.stats().blocks(), 0);
}

#[tokio::test]
async fn test_malformed_fingerprint_is_desync() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"ABCD");

	let (driver_side, mut fake_target) = memory_pair(4096);
	codec::send_message(&mut fake_target, &Message::Size(4)).await.unwrap();
	fake_target.send_line("not-a-digest").await.unwrap();

	let source = LocalSource::open(&src, 4, DigestAlgorithm::Sha1).await.unwrap();
	let mut session = SyncSession::new(source, driver_side, options(4, DigestAlgorithm::Sha1));
	assert!(matches!(session.run().await, Err(SyncError::ProtocolDesync { block: 0, .. })));
}

#[tokio::test]
async fn test_silent_target_times_out() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"ABCD");

	let (driver_side, _silent) = memory_pair(4096);
	let driver_side = driver_side.with_timeout(Some(Duration::from_millis(50)));

	let source = LocalSource::open(&src, 4, DigestAlgorithm::Sha1).await.unwrap();
	let mut session = SyncSession::new(source, driver_side, options(4, DigestAlgorithm::Sha1));
	assert!(matches!(session.run().await, Err(SyncError::Timeout { .. })));
}

#[tokio::test]
async fn test_target_gone_before_size() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"ABCD");

	let (driver_side, fake_target) = memory_pair(4096);
	drop(fake_target);

	let source = LocalSource::open(&src, 4, DigestAlgorithm::Sha1).await.unwrap();
	let mut session = SyncSession::new(source, driver_side, options(4, DigestAlgorithm::Sha1));
	assert!(matches!(
		session.run().await,
		Err(SyncError::Connection(ConnectionError::HandshakeFailed { .. }))
	));
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_target_matches_source_for_many_block_sizes() {
	let size = 1000;
	for &block_size in &[1usize, 3, 4, 7, 64, 999, 1000, 4096] {
		let dir = TempDir::new().unwrap();
		let source_bytes = noise(size, 7);
		let mut target_bytes = source_bytes.clone();
		for i in (0..size).step_by(97) {
			target_bytes[i] = target_bytes[i].wrapping_add(1);
		}
		let src = create_file(dir.path(), "src.img", &source_bytes);
		let tgt = create_file(dir.path(), "tgt.img", &target_bytes);

		let (driver, responder) =
			sync_in_memory(&src, &tgt, options(block_size, DigestAlgorithm::Sha1)).await;
		let stats = driver.unwrap();
		responder.unwrap();

		assert_eq!(fs::read(&tgt).unwrap(), source_bytes, "block size {}", block_size);
		assert_eq!(stats.blocks(), block_count(size as u64, block_size), "block size {}", block_size);
		assert_eq!(stats.blocks(), stats.expected_blocks);
		assert!(stats.diff_blocks > 0);
	}
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", &noise(4096 + 100, 3));
	let tgt = create_file(dir.path(), "tgt.img", &noise(4096 + 100, 4));

	let (first, _) = sync_in_memory(&src, &tgt, options(512, DigestAlgorithm::Sha1)).await;
	assert!(first.unwrap().diff_blocks > 0);

	let (second, responder) = sync_in_memory(&src, &tgt, options(512, DigestAlgorithm::Sha1)).await;
	let second = second.unwrap();
	assert_eq!(second.diff_blocks, 0);
	assert_eq!(second.bytes_transferred, 0);
	assert_eq!(second.same_blocks, 9);
	assert_eq!(responder.unwrap().diff_blocks, 0);
}

#[tokio::test]
async fn test_short_final_block_has_exact_length() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"ABCDEFGHIJ");
	let tgt = create_file(dir.path(), "tgt.img", b"ABCDEFGHZZ");

	let (driver, _) = sync_in_memory(&src, &tgt, options(4, DigestAlgorithm::Sha1)).await;
	let stats = driver.unwrap();

	assert_eq!(stats.same_blocks, 2);
	assert_eq!(stats.diff_blocks, 1);
	assert_eq!(stats.bytes_transferred, 2);
	assert_eq!(fs::read(&tgt).unwrap(), b"ABCDEFGHIJ".to_vec());
}

#[tokio::test]
async fn test_empty_stores() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"");
	let tgt = create_file(dir.path(), "tgt.img", b"");

	let (driver, responder) = sync_in_memory(&src, &tgt, options(4, DigestAlgorithm::Sha1)).await;
	let stats = driver.unwrap();
	assert_eq!(stats.blocks(), 0);
	assert_eq!(stats.expected_blocks, 0);
	assert_eq!(responder.unwrap(), ResponderStats::default());
}

#[tokio::test]
async fn test_blake3_digest() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", &noise(300, 5));
	let tgt = create_file(dir.path(), "tgt.img", &noise(300, 6));

	let (driver, _) = sync_in_memory(&src, &tgt, options(64, DigestAlgorithm::Blake3)).await;
	assert_eq!(driver.unwrap().diff_blocks, 5);
	assert_eq!(fs::read(&tgt).unwrap(), noise(300, 5));
}

// ============================================================================
// Source served by a responder
// ============================================================================

#[tokio::test]
async fn test_remote_source_to_target_responder() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"ABCDEFGHIJ");
	let tgt = create_file(dir.path(), "tgt.img", b"ABCDXXXXIJ");
	let opts = options(4, DigestAlgorithm::Sha1);

	let (source_driver, source_responder) = memory_pair(64 * 1024);
	let source_task = tokio::spawn(
		Responder::open(Role::Source, &src, 4, opts.digest, source_responder).await.unwrap().run(),
	);
	let (target_driver, target_responder) = memory_pair(64 * 1024);
	let target_task = tokio::spawn(
		Responder::open(Role::Target, &tgt, 4, opts.digest, target_responder).await.unwrap().run(),
	);

	let source = RemoteSource::connect(source_driver, "memory-source", 4, opts.digest).await.unwrap();
	let mut session = SyncSession::new(source, target_driver, opts);
	let stats = session.run().await.unwrap();
	drop(session);

	assert_eq!((stats.same_blocks, stats.diff_blocks), (2, 1));
	assert_eq!(source_task.await.unwrap().unwrap().diff_blocks, 1);
	assert_eq!(target_task.await.unwrap().unwrap().diff_blocks, 1);
	assert_eq!(fs::read(&tgt).unwrap(), b"ABCDEFGHIJ".to_vec());
	assert_eq!(fs::read(&src).unwrap(), b"ABCDEFGHIJ".to_vec());
}

#[tokio::test]
async fn test_remote_source_size_mismatch_aborts_both() {
	let dir = TempDir::new().unwrap();
	let src = create_file(dir.path(), "src.img", b"ABCDEFGH");
	let tgt = create_file(dir.path(), "tgt.img", b"ABCD");
	let opts = options(4, DigestAlgorithm::Sha1);

	let (source_driver, source_responder) = memory_pair(64 * 1024);
	let source_task = tokio::spawn(
		Responder::open(Role::Source, &src, 4, opts.digest, source_responder).await.unwrap().run(),
	);
	let (target_driver, target_responder) = memory_pair(64 * 1024);
	let target_task = tokio::spawn(
		Responder::open(Role::Target, &tgt, 4, opts.digest, target_responder).await.unwrap().run(),
	);

	let source = RemoteSource::connect(source_driver, "memory-source", 4, opts.digest).await.unwrap();
	let mut session = SyncSession::new(source, target_driver, opts);
	assert!(matches!(session.run().await, Err(SyncError::SizeMismatch { .. })));
	drop(session);

	assert!(source_task.await.unwrap().unwrap().aborted);
	assert!(target_task.await.unwrap().unwrap().aborted);
	assert_eq!(fs::read(&tgt).unwrap(), b"ABCD".to_vec());
}

// vim: ts=4
