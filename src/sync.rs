//! Public sync API
//!
//! ```rust,ignore
//! use blocksync::sync::SyncBuilder;
//!
//! let stats = SyncBuilder::new()
//!     .source("/dev/vg0/root-snap")
//!     .target("backup:/dev/vg1/root-copy")
//!     .block_size(4 * 1024 * 1024)
//!     .compress(true)
//!     .sync()
//!     .await?;
//! println!("same: {}, diff: {}", stats.same_blocks, stats.diff_blocks);
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::connection::{self, EndpointProcess, Location};
use crate::engine::{SyncProgressCallback, SyncSession, SyncStats};
use crate::error::SyncError;
use crate::fingerprint::DigestAlgorithm;
use crate::logging::*;
use crate::responder::Role;
use crate::source::{BlockSource, LocalSource, RemoteSource};

/// How long a responder gets to exit after a failed session
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for a one-shot sync of a source store onto a target store
pub struct SyncBuilder {
	source: Option<String>,
	target: Option<String>,
	config: SyncConfig,
	callback: Option<Arc<dyn SyncProgressCallback>>,
	cancel: Option<Arc<AtomicBool>>,
}

impl SyncBuilder {
	pub fn new() -> Self {
		Self::with_config(SyncConfig::default())
	}

	pub fn with_config(config: SyncConfig) -> Self {
		SyncBuilder { source: None, target: None, config, callback: None, cancel: None }
	}

	pub fn source(mut self, location: &str) -> Self {
		self.source = Some(location.to_string());
		self
	}

	pub fn target(mut self, location: &str) -> Self {
		self.target = Some(location.to_string());
		self
	}

	pub fn block_size(mut self, block_size: usize) -> Self {
		self.config.block_size = block_size;
		self
	}

	pub fn digest(mut self, digest: DigestAlgorithm) -> Self {
		self.config.digest = digest;
		self
	}

	pub fn compress(mut self, compress: bool) -> Self {
		self.config.compress = compress;
		self
	}

	pub fn cipher(mut self, cipher: &str) -> Self {
		self.config.cipher = Some(cipher.to_string());
		self
	}

	pub fn timeout_secs(mut self, secs: u64) -> Self {
		self.config.timeout_secs = Some(secs);
		self
	}

	/// Program started for local endpoints
	pub fn local_command(mut self, program: &str) -> Self {
		self.config.local_command = Some(program.to_string());
		self
	}

	/// Program started on remote hosts
	pub fn remote_command(mut self, program: &str) -> Self {
		self.config.remote_command = program.to_string();
		self
	}

	pub fn on_event(mut self, callback: Arc<dyn SyncProgressCallback>) -> Self {
		self.callback = Some(callback);
		self
	}

	/// Stop between blocks once `flag` is raised
	pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
		self.cancel = Some(flag);
		self
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	pub fn source_location(&self) -> Option<&str> {
		self.source.as_deref()
	}

	pub fn target_location(&self) -> Option<&str> {
		self.target.as_deref()
	}

	/// Run the sync
	pub async fn sync(self) -> Result<SyncStats, SyncError> {
		self.config.validate()?;
		let source = parse_location(self.source.as_deref(), "source")?;
		let target = parse_location(self.target.as_deref(), "target")?;
		if same_store(&source, &target).await {
			return Err(SyncError::InvalidConfig {
				message: format!("source and target are the same store: {}", source),
			});
		}
		info!("Syncing {} → {} ({} byte blocks)", source, target, self.config.block_size);

		match &source {
			// A local source is opened before anything is spawned
			Location::Local { path } => {
				let local =
					LocalSource::open(path, self.config.block_size, self.config.digest).await?;
				self.drive(local, &target).await
			}
			Location::Remote { .. } => {
				let endpoint = connection::connect(&source, Role::Source, &self.config).await?;
				let (transport, process) = endpoint.split();
				let remote = RemoteSource::connect(
					transport,
					source.to_string(),
					self.config.block_size,
					self.config.digest,
				)
				.await?;
				let result = self.drive(remote, &target).await;
				match result {
					Ok(stats) => {
						process.wait().await?;
						Ok(stats)
					}
					Err(e) => {
						self.settle(process).await;
						Err(e)
					}
				}
			}
		}
	}

	/// Start the target responder and run the session against it
	async fn drive<S: BlockSource>(&self, source: S, target: &Location) -> Result<SyncStats, SyncError> {
		let endpoint = connection::connect(target, Role::Target, &self.config).await?;
		let (transport, process) = endpoint.split();

		let mut session = SyncSession::new(source, transport, self.config.session_options());
		if let Some(flag) = &self.cancel {
			session = session.with_cancel_flag(flag.clone());
		}
		if let Some(callback) = &self.callback {
			session = session.with_callback(callback.clone());
		}

		let result = session.run().await;
		// Closing the streams lets the responders exit
		drop(session);
		match result {
			Ok(stats) => {
				process.wait().await?;
				Ok(stats)
			}
			Err(e) => {
				self.settle(process).await;
				Err(e)
			}
		}
	}

	/// Let a responder finish after a failed session. The session error is
	/// what gets reported; the exit status is only logged.
	async fn settle(&self, process: EndpointProcess) {
		let limit = self.config.timeout().unwrap_or(SETTLE_TIMEOUT);
		if let Err(e) = process.wait_within(Some(limit)).await {
			debug!("Endpoint did not end cleanly after the failure: {}", e);
		}
	}
}

impl Default for SyncBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn parse_location(location: Option<&str>, what: &str) -> Result<Location, SyncError> {
	let location = location.ok_or_else(|| SyncError::InvalidConfig {
		message: format!("no {} location given", what),
	})?;
	Location::parse(location)
}

/// Whether two locations name the same store. Local paths are compared
/// after resolving links and relative components; remote ones textually.
async fn same_store(a: &Location, b: &Location) -> bool {
	if a == b {
		return true;
	}
	match (a, b) {
		(Location::Local { path: a }, Location::Local { path: b }) => {
			match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
				(Ok(a), Ok(b)) => a == b,
				_ => false,
			}
		}
		_ => false,
	}
}

/// Sync `source` onto `target` with `config`
pub async fn sync(config: SyncConfig, source: &str, target: &str) -> Result<SyncStats, SyncError> {
	SyncBuilder::with_config(config).source(source).target(target).sync().await
}


// vim: ts=4
