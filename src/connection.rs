//! Endpoint locations and the processes that serve them
//!
//! Every store is served by a responder process talking the line protocol
//! on its stdin/stdout. Remote stores are reached through the remote shell,
//! local ones through this executable.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, Command};

use crate::config::SyncConfig;
use crate::error::{ConnectionError, SyncError};
use crate::logging::*;
use crate::protocol::{ChildTransport, StreamTransport};
use crate::responder::Role;

/// Where a store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
	Local { path: PathBuf },
	Remote { user: Option<String>, host: String, path: String },
}

impl Location {
	/// Parse a location string.
	///
	/// Accepted forms:
	/// - `/dev/sdb`, `./disk.img`, `~/disk.img`, `disk.img`: local
	/// - `file:///dev/sdb`: local
	/// - `[user@]host:path`: remote (scp style)
	/// - `ssh://[user@]host/path`: remote, the path is everything after the
	///   slash that ends the host, so `ssh://h//dev/sdb` names `/dev/sdb`
	pub fn parse(location: &str) -> Result<Self, SyncError> {
		let invalid = |reason: &str| SyncError::InvalidLocation {
			location: location.to_string(),
			reason: reason.to_string(),
		};

		if location.is_empty() {
			return Err(invalid("empty location"));
		}

		if let Some(path) = location.strip_prefix("file://") {
			if path.is_empty() {
				return Err(invalid("missing path"));
			}
			return Ok(Location::Local { path: PathBuf::from(path) });
		}

		if let Some(rest) = location.strip_prefix("ssh://") {
			let (authority, path) = rest.split_once('/').ok_or_else(|| invalid("missing path"))?;
			if path.is_empty() {
				return Err(invalid("missing path"));
			}
			let (user, host) = split_authority(authority).map_err(|reason| invalid(reason))?;
			return Ok(Location::Remote { user, host, path: path.to_string() });
		}

		let is_local_path =
			location.starts_with('/') || location.starts_with('.') || location.starts_with('~');
		if !is_local_path {
			if let Some((authority, path)) = location.split_once(':') {
				if path.is_empty() {
					return Err(invalid("missing path"));
				}
				let (user, host) = split_authority(authority).map_err(|reason| invalid(reason))?;
				return Ok(Location::Remote { user, host, path: path.to_string() });
			}
		}

		Ok(Location::Local { path: PathBuf::from(location) })
	}

	pub fn is_remote(&self) -> bool {
		matches!(self, Location::Remote { .. })
	}

	/// Path of the store on the machine that serves it
	pub fn path(&self) -> String {
		match self {
			Location::Local { path } => path.display().to_string(),
			Location::Remote { path, .. } => path.clone(),
		}
	}
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Location::Local { path } => write!(f, "{}", path.display()),
			Location::Remote { user: Some(user), host, path } => {
				write!(f, "{}@{}:{}", user, host, path)
			}
			Location::Remote { user: None, host, path } => write!(f, "{}:{}", host, path),
		}
	}
}

impl FromStr for Location {
	type Err = SyncError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Location::parse(s)
	}
}

fn split_authority(authority: &str) -> Result<(Option<String>, String), &'static str> {
	let (user, host) = match authority.rsplit_once('@') {
		Some((user, host)) => {
			if user.is_empty() {
				return Err("empty user name");
			}
			(Some(user.to_string()), host)
		}
		None => (None, authority),
	};
	if host.is_empty() {
		return Err("missing host");
	}
	Ok((user, host.to_string()))
}

/// Program and arguments that start a responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCommand {
	pub program: String,
	pub args: Vec<String>,
}

impl fmt::Display for EndpointCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.program)?;
		for arg in &self.args {
			write!(f, " {}", arg)?;
		}
		Ok(())
	}
}

/// Build the command serving `location` in `role`
pub fn endpoint_command(
	location: &Location,
	role: Role,
	config: &SyncConfig,
) -> Result<EndpointCommand, SyncError> {
	let serve_args = |path: String| -> Vec<String> {
		vec![
			"serve".to_string(),
			"--role".to_string(),
			role.name().to_string(),
			"--block-size".to_string(),
			config.block_size.to_string(),
			"--digest".to_string(),
			config.digest.name().to_string(),
			path,
		]
	};

	match location {
		Location::Remote { user, host, path } => {
			let mut args = Vec::new();
			if config.compress {
				args.push("-C".to_string());
			}
			if let Some(cipher) = &config.cipher {
				args.push("-c".to_string());
				args.push(cipher.clone());
			}
			if let Some(user) = user {
				args.push("-l".to_string());
				args.push(user.clone());
			}
			args.extend(config.ssh_args.iter().cloned());
			args.push(host.clone());
			args.push(config.remote_command.clone());
			// The remote shell re-splits its command line
			args.extend(serve_args(shell_quote(path)));
			Ok(EndpointCommand { program: config.ssh_command.clone(), args })
		}
		Location::Local { path } => {
			let program = match &config.local_command {
				Some(program) => program.clone(),
				None => std::env::current_exe()
					.map_err(|e| ConnectionError::SpawnFailed {
						cmd: "blocksync serve".to_string(),
						source: e,
					})?
					.display()
					.to_string(),
			};
			Ok(EndpointCommand { program, args: serve_args(path.display().to_string()) })
		}
	}
}

/// Quote `s` for a POSIX shell unless it is made of safe characters only
fn shell_quote(s: &str) -> String {
	let safe = !s.is_empty()
		&& s.chars().all(|c| c.is_ascii_alphanumeric() || "/._-+:,=@%".contains(c));
	if safe {
		s.to_string()
	} else {
		format!("'{}'", s.replace('\'', r"'\''"))
	}
}

/// A running responder process and the transport to it
pub struct Endpoint {
	location: Location,
	role: Role,
	transport: ChildTransport,
	process: EndpointProcess,
}

impl fmt::Debug for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Endpoint")
			.field("location", &self.location)
			.field("role", &self.role)
			.finish()
	}
}

impl Endpoint {
	pub fn location(&self) -> &Location {
		&self.location
	}

	pub fn role(&self) -> Role {
		self.role
	}

	/// Separate the protocol stream from the process handle
	pub fn split(self) -> (ChildTransport, EndpointProcess) {
		(self.transport, self.process)
	}
}

/// Handle of a responder process. The process is killed when dropped.
pub struct EndpointProcess {
	location: String,
	child: Child,
	timeout: Option<Duration>,
}

impl EndpointProcess {
	/// Wait for the process to exit and check its status.
	///
	/// Call this after the transport has been dropped so the responder sees
	/// its input close.
	pub async fn wait(self) -> Result<(), SyncError> {
		let limit = self.timeout;
		self.wait_within(limit).await
	}

	/// Like [`wait`](Self::wait) with an explicit limit. The process is
	/// killed if it is still running when the limit expires.
	pub async fn wait_within(mut self, limit: Option<Duration>) -> Result<(), SyncError> {
		let waiting = self.child.wait();
		let status = match limit {
			Some(limit) => tokio::time::timeout(limit, waiting)
				.await
				.map_err(|_| SyncError::Timeout { after: limit })?,
			None => waiting.await,
		}
		.map_err(|e| ConnectionError::Disconnected { message: e.to_string() })?;

		if !status.success() {
			return Err(ConnectionError::RemoteFailed {
				location: self.location.clone(),
				status: status.to_string(),
			}
			.into());
		}
		debug!("Endpoint {} exited cleanly", self.location);
		Ok(())
	}
}

/// Start the responder for `location` in `role`
pub async fn connect(
	location: &Location,
	role: Role,
	config: &SyncConfig,
) -> Result<Endpoint, SyncError> {
	let command = endpoint_command(location, role, config)?;
	info!("Starting {} endpoint for {}", role, location);
	debug!("Endpoint command: {}", command);

	let mut child = Command::new(&command.program)
		.args(&command.args)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::inherit())
		.kill_on_drop(true)
		.spawn()
		.map_err(|e| match location {
			Location::Remote { host, .. } => ConnectionError::SshFailed { host: host.clone(), source: e },
			Location::Local { .. } => ConnectionError::SpawnFailed { cmd: command.to_string(), source: e },
		})?;

	let stdin = child
		.stdin
		.take()
		.ok_or(ConnectionError::StdioUnavailable { what: "stdin".to_string() })?;
	let stdout = child
		.stdout
		.take()
		.ok_or(ConnectionError::StdioUnavailable { what: "stdout".to_string() })?;

	let transport = StreamTransport::new(BufReader::new(stdout), stdin).with_timeout(config.timeout());
	let process = EndpointProcess { location: location.to_string(), child, timeout: config.timeout() };
	Ok(Endpoint { location: location.clone(), role, transport, process })
}


// vim: ts=4
