//! Progress display callback for CLI sync
//!
//! Renders one status line on stderr, redrawn in place with `\r`, and a
//! summary once the session finishes.

pub mod constants;

use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

use crate::engine::{SyncEvent, SyncProgressCallback, SyncStats};

/// Progress display constants
pub use constants::*;

/// Shared state for progress tracking
#[derive(Debug)]
pub struct ProgressState {
	pub block_size: Mutex<usize>,
	pub last_update: Mutex<Option<Instant>>,
}

impl ProgressState {
	pub fn new() -> Self {
		Self { block_size: Mutex::new(0), last_update: Mutex::new(None) }
	}
}

impl Default for ProgressState {
	fn default() -> Self {
		Self::new()
	}
}

/// CLI progress callback
pub struct CliProgressCallback {
	state: ProgressState,
}

impl CliProgressCallback {
	pub fn new() -> Self {
		Self { state: ProgressState::new() }
	}

	fn should_draw(&self, stats: &SyncStats) -> bool {
		let mut last = self.state.last_update.lock().unwrap_or_else(|e| e.into_inner());
		let due = match *last {
			Some(at) => at.elapsed().as_millis() >= UPDATE_THROTTLE_MS,
			None => true,
		};
		// The last block is always drawn so the line ends complete
		if !due && stats.blocks() < stats.expected_blocks {
			return false;
		}
		*last = Some(Instant::now());
		true
	}
}

impl Default for CliProgressCallback {
	fn default() -> Self {
		Self::new()
	}
}

impl SyncProgressCallback for CliProgressCallback {
	fn on_event(&self, event: SyncEvent) {
		match event {
			SyncEvent::Started { size, block_size, expected_blocks } => {
				*self.state.block_size.lock().unwrap_or_else(|e| e.into_inner()) = block_size;
				info!(
					"→ Comparing {:.1} MiB in {} blocks of {} bytes",
					size as f64 / BYTES_PER_MIB,
					expected_blocks,
					block_size
				);
			}
			SyncEvent::Block { stats, .. } => {
				if !self.should_draw(&stats) {
					return;
				}
				let block_size = *self.state.block_size.lock().unwrap_or_else(|e| e.into_inner());
				let _ = write!(std::io::stderr(), "\r  {}", format_progress(&stats, block_size));
				let _ = std::io::stderr().flush();
			}
			SyncEvent::Finished(stats) => {
				if stats.expected_blocks > 0 {
					let _ = writeln!(std::io::stderr());
				}
				info!(
					"✓ Completed in {:.1}s: {} same, {} diff, {:.1} MiB sent",
					stats.elapsed.as_secs_f64(),
					stats.same_blocks,
					stats.diff_blocks,
					stats.bytes_transferred as f64 / BYTES_PER_MIB
				);
			}
		}
	}
}

/// Read rate in MiB/s over the bytes compared so far
pub fn compare_rate(stats: &SyncStats, block_size: usize) -> f64 {
	let compared = (stats.blocks() * block_size as u64).min(stats.size);
	let secs = stats.elapsed.max(Duration::from_millis(1)).as_secs_f64();
	compared as f64 / BYTES_PER_MIB / secs
}

/// One progress line, without the leading carriage return
pub fn format_progress(stats: &SyncStats, block_size: usize) -> String {
	let ratio = if stats.expected_blocks > 0 {
		(stats.blocks() as f64 / stats.expected_blocks as f64).clamp(0.0, 1.0)
	} else {
		1.0
	};
	let filled = (ratio * PROGRESS_BAR_WIDTH as f64) as usize;
	format!(
		"[{}{}] same: {}, diff: {}, {}/{} blocks | {:.1} MiB/s",
		"=".repeat(filled),
		" ".repeat(PROGRESS_BAR_WIDTH - filled),
		stats.same_blocks,
		stats.diff_blocks,
		stats.blocks(),
		stats.expected_blocks,
		compare_rate(stats, block_size)
	)
}


// vim: ts=4
