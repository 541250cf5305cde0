//! Configuration for blocksync sessions
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`SyncConfig::default()`)
//! 2. Config file (`--config FILE`, else `$XDG_CONFIG_HOME/blocksync/config.toml`
//!    or `~/.config/blocksync/config.toml` when present)
//! 3. Environment variables (`BLOCKSYNC_*` prefix)
//! 4. CLI flags (highest priority, applied by the caller)

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{SessionOptions, DEFAULT_BLOCK_SIZE};
use crate::error::SyncError;
use crate::fingerprint::DigestAlgorithm;

/// Largest block size accepted (1 GiB)
pub const MAX_BLOCK_SIZE: usize = 1 << 30;

/// Longest timeout accepted, in seconds
pub const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncConfig {
	/// Bytes per block
	pub block_size: usize,

	/// Fingerprint digest; both endpoints must use the same one
	pub digest: DigestAlgorithm,

	/// Ask ssh to compress the stream (`-C`)
	pub compress: bool,

	/// Cipher passed to ssh (`-c`)
	pub cipher: Option<String>,

	/// Remote shell program
	pub ssh_command: String,

	/// Extra arguments for the remote shell, placed before the host
	pub ssh_args: Vec<String>,

	/// Program started on the remote host
	pub remote_command: String,

	/// Program started for local endpoints (defaults to this executable)
	pub local_command: Option<String>,

	/// Give up when a peer is silent this long
	pub timeout_secs: Option<u64>,

	/// Show a progress line on stderr
	pub progress: bool,

	/// Debug logging
	pub verbose: bool,
}

impl Default for SyncConfig {
	fn default() -> Self {
		SyncConfig {
			block_size: DEFAULT_BLOCK_SIZE,
			digest: DigestAlgorithm::default(),
			compress: false,
			cipher: None,
			ssh_command: "ssh".to_string(),
			ssh_args: Vec::new(),
			remote_command: "blocksync".to_string(),
			local_command: None,
			timeout_secs: None,
			progress: false,
			verbose: false,
		}
	}
}

impl SyncConfig {
	/// Defaults, then the config file, then `BLOCKSYNC_*` variables.
	///
	/// An explicit `path` must exist; the default location is optional.
	pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => match default_config_path() {
				Some(path) if path.is_file() => Self::from_file(&path)?,
				_ => Self::default(),
			},
		};
		config.apply_env(env::vars())?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, SyncError> {
		let text = fs::read_to_string(path).map_err(|e| SyncError::InvalidConfig {
			message: format!("cannot read {}: {}", path.display(), e),
		})?;
		Self::from_toml(&text).map_err(|e| SyncError::InvalidConfig {
			message: format!("{}: {}", path.display(), e),
		})
	}

	pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	/// Apply `BLOCKSYNC_*` overrides from `vars`
	pub fn apply_env<I>(&mut self, vars: I) -> Result<(), SyncError>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			let invalid = |reason: String| SyncError::InvalidConfig {
				message: format!("{}={:?}: {}", key, value, reason),
			};
			match key.as_str() {
				"BLOCKSYNC_BLOCK_SIZE" => self.block_size = parse_byte_size(&value).map_err(invalid)?,
				"BLOCKSYNC_DIGEST" => self.digest = value.parse().map_err(invalid)?,
				"BLOCKSYNC_COMPRESS" => self.compress = parse_flag(&value).map_err(invalid)?,
				"BLOCKSYNC_CIPHER" => self.cipher = non_empty(&value),
				"BLOCKSYNC_SSH" => self.ssh_command = value.clone(),
				"BLOCKSYNC_REMOTE_COMMAND" => self.remote_command = value.clone(),
				"BLOCKSYNC_TIMEOUT" => {
					self.timeout_secs = match value.trim() {
						"" | "0" => None,
						secs => Some(secs.parse().map_err(|e| invalid(format!("{}", e)))?),
					}
				}
				_ => {}
			}
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		if self.block_size == 0 {
			return Err(invalid_config("block size must be greater than 0".to_string()));
		}
		if self.block_size > MAX_BLOCK_SIZE {
			return Err(invalid_config(format!(
				"block size {} exceeds maximum {}",
				self.block_size, MAX_BLOCK_SIZE
			)));
		}
		if let Some(secs) = self.timeout_secs {
			if secs == 0 || secs > MAX_TIMEOUT_SECS {
				return Err(invalid_config(format!(
					"timeout must be between 1 and {} seconds, got {}",
					MAX_TIMEOUT_SECS, secs
				)));
			}
		}
		if self.remote_command.trim().is_empty() {
			return Err(invalid_config("remote command must not be empty".to_string()));
		}
		if self.ssh_command.trim().is_empty() {
			return Err(invalid_config("ssh command must not be empty".to_string()));
		}
		Ok(())
	}

	pub fn timeout(&self) -> Option<Duration> {
		self.timeout_secs.map(Duration::from_secs)
	}

	pub fn session_options(&self) -> SessionOptions {
		SessionOptions { block_size: self.block_size, digest: self.digest }
	}
}

/// `$XDG_CONFIG_HOME/blocksync/config.toml`, falling back to `~/.config`
pub fn default_config_path() -> Option<PathBuf> {
	let base = match env::var_os("XDG_CONFIG_HOME") {
		Some(dir) if !dir.is_empty() => PathBuf::from(dir),
		_ => PathBuf::from(env::var_os("HOME")?).join(".config"),
	};
	Some(base.join("blocksync").join("config.toml"))
}

/// Parse `1048576`, `512K`, `4M`, `1G` (binary multiples)
pub fn parse_byte_size(s: &str) -> Result<usize, String> {
	let s = s.trim();
	let (digits, shift) = match s.char_indices().last() {
		Some((i, c)) if c.is_ascii_alphabetic() => {
			let shift = match c.to_ascii_uppercase() {
				'K' => 10,
				'M' => 20,
				'G' => 30,
				other => return Err(format!("unknown size suffix '{}'", other)),
			};
			(&s[..i], shift)
		}
		_ => (s, 0),
	};
	let base: usize = digits.trim().parse().map_err(|_| format!("invalid size '{}'", s))?;
	base.checked_mul(1usize << shift).ok_or_else(|| format!("size '{}' is too large", s))
}

fn parse_flag(value: &str) -> Result<bool, String> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" | "" => Ok(false),
		other => Err(format!("expected a boolean, got '{}'", other)),
	}
}

fn non_empty(value: &str) -> Option<String> {
	let value = value.trim();
	if value.is_empty() {
		None
	} else {
		Some(value.to_string())
	}
}

fn invalid_config(message: String) -> SyncError {
	SyncError::InvalidConfig { message }
}


// vim: ts=4
