use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use blocksync::config::{parse_byte_size, SyncConfig};
use blocksync::logging::*;
use blocksync::progress::CliProgressCallback;
use blocksync::{serve, signals, DigestAlgorithm, Role, SyncBuilder, SyncError};

fn cli() -> Command {
	Command::new("blocksync")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilu@symbion.hu>")
		.about("Synchronize block devices and large files, sending only the blocks that differ")
		.subcommand_required(true)
		.subcommand(
			Command::new("sync")
				.about("Make DST identical to SRC (both must have the same size)")
				.arg(Arg::new("src").required(true).help("Source: path, host:path or ssh://host/path"))
				.arg(Arg::new("dst").required(true).help("Target: path, host:path or ssh://host/path"))
				.arg(
					Arg::new("block-size")
						.short('b')
						.long("block-size")
						.value_name("BYTES")
						.value_parser(parse_byte_size)
						.help("Block size, e.g. 1048576, 512K or 4M [default: 1M]"),
				)
				.arg(
					Arg::new("compress")
						.short('c')
						.long("compress")
						.action(ArgAction::SetTrue)
						.help("Enable ssh compression"),
				)
				.arg(
					Arg::new("cipher")
						.long("cipher")
						.value_name("CIPHER")
						.help("Cipher for ssh (-c)"),
				)
				.arg(
					Arg::new("progress")
						.short('p')
						.long("progress")
						.action(ArgAction::SetTrue)
						.help("Show progress on stderr"),
				)
				.arg(
					Arg::new("verbose")
						.short('v')
						.long("verbose")
						.action(ArgAction::SetTrue)
						.help("Debug logging"),
				)
				.arg(
					Arg::new("timeout")
						.long("timeout")
						.value_name("SECS")
						.value_parser(value_parser!(u64))
						.help("Give up when a peer is silent this long"),
				)
				.arg(
					Arg::new("digest")
						.long("digest")
						.value_name("ALG")
						.value_parser(parse_digest)
						.help("Block fingerprint: sha1 or blake3 [default: sha1]"),
				)
				.arg(
					Arg::new("remote-command")
						.long("remote-command")
						.value_name("PROGRAM")
						.help("blocksync executable on remote hosts"),
				)
				.arg(
					Arg::new("config")
						.long("config")
						.value_name("FILE")
						.value_parser(value_parser!(PathBuf))
						.help("Config file (TOML)"),
				),
		)
		.subcommand(
			Command::new("serve")
				.about("Serving mode (used internally)")
				.arg(
					Arg::new("role")
						.long("role")
						.required(true)
						.value_parser(parse_role)
						.help("source or target"),
				)
				.arg(
					Arg::new("block-size")
						.short('b')
						.long("block-size")
						.required(true)
						.value_parser(parse_byte_size),
				)
				.arg(Arg::new("digest").long("digest").default_value("sha1").value_parser(parse_digest))
				.arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::SetTrue))
				.arg(Arg::new("path").required(true).value_parser(value_parser!(PathBuf))),
		)
}

fn parse_digest(s: &str) -> Result<DigestAlgorithm, String> {
	s.parse()
}

fn parse_role(s: &str) -> Result<Role, String> {
	s.parse()
}

fn required<'a, T: Clone + Send + Sync + 'static>(
	matches: &'a ArgMatches,
	name: &str,
) -> Result<&'a T, SyncError> {
	matches
		.get_one::<T>(name)
		.ok_or_else(|| SyncError::InvalidConfig { message: format!("missing argument <{}>", name) })
}

async fn run_serve(matches: &ArgMatches) -> Result<(), SyncError> {
	init_tracing(matches.get_flag("verbose"));
	let role = *required::<Role>(matches, "role")?;
	let block_size = *required::<usize>(matches, "block-size")?;
	let digest = *required::<DigestAlgorithm>(matches, "digest")?;
	let path = required::<PathBuf>(matches, "path")?;
	signals::ignore_interrupts();

	serve::serve(path, role, block_size, digest).await.map(|_| ())
}

async fn run_sync(matches: &ArgMatches) -> Result<(), SyncError> {
	let config_path = matches.get_one::<PathBuf>("config");
	let mut config = SyncConfig::load(config_path.map(PathBuf::as_path))?;

	// CLI flags override file and environment
	if let Some(block_size) = matches.get_one::<usize>("block-size") {
		config.block_size = *block_size;
	}
	if matches.get_flag("compress") {
		config.compress = true;
	}
	if let Some(cipher) = matches.get_one::<String>("cipher") {
		config.cipher = Some(cipher.clone());
	}
	if matches.get_flag("progress") {
		config.progress = true;
	}
	if matches.get_flag("verbose") {
		config.verbose = true;
	}
	if let Some(timeout) = matches.get_one::<u64>("timeout") {
		config.timeout_secs = Some(*timeout);
	}
	if let Some(digest) = matches.get_one::<DigestAlgorithm>("digest") {
		config.digest = *digest;
	}
	if let Some(program) = matches.get_one::<String>("remote-command") {
		config.remote_command = program.clone();
	}

	init_tracing(config.verbose);
	config.validate()?;

	let src = required::<String>(matches, "src")?;
	let dst = required::<String>(matches, "dst")?;

	let abort = Arc::new(AtomicBool::new(false));
	signals::setup_signal_handlers(abort.clone());

	let progress = config.progress;
	let mut builder = SyncBuilder::with_config(config).source(src).target(dst).cancel_flag(abort);
	if progress {
		builder = builder.on_event(Arc::new(CliProgressCallback::new()));
	}

	let stats = builder.sync().await?;
	println!(
		"same: {}, diff: {}, {}/{} blocks, {:.1}s",
		stats.same_blocks,
		stats.diff_blocks,
		stats.blocks(),
		stats.expected_blocks,
		stats.elapsed.as_secs_f64()
	);
	Ok(())
}

#[tokio::main]
async fn main() {
	let matches = cli().get_matches();

	let result = match matches.subcommand() {
		Some(("serve", sub)) => run_serve(sub).await,
		Some(("sync", sub)) => run_sync(sub).await,
		_ => Ok(()),
	};

	if let Err(e) = result {
		// No-op when the subscriber is already up
		init_tracing(false);
		error!("{}", e);
		std::process::exit(exit_code(&e, signals::received_exit_code()));
	}
}

/// A cancelled sync exits with the code of the signal that cancelled it
fn exit_code(e: &SyncError, signal: Option<i32>) -> i32 {
	match (e, signal) {
		(SyncError::Aborted { .. }, Some(code)) => code,
		_ => e.exit_code(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::Path;

	#[test]
	fn test_cli_is_consistent() {
		cli().debug_assert();
	}

	#[test]
	fn test_sync_args() {
		let matches = cli()
			.try_get_matches_from(["blocksync", "sync", "-b", "4K", "-c", "--digest", "blake3", "a.img", "host:/b"])
			.unwrap();
		let (name, sub) = matches.subcommand().unwrap();
		assert_eq!(name, "sync");
		assert_eq!(sub.get_one::<usize>("block-size"), Some(&4096));
		assert!(sub.get_flag("compress"));
		assert_eq!(sub.get_one::<DigestAlgorithm>("digest"), Some(&DigestAlgorithm::Blake3));
		assert_eq!(sub.get_one::<String>("dst").map(String::as_str), Some("host:/b"));
	}

	#[test]
	fn test_exit_code_follows_signal() {
		let aborted = SyncError::Aborted { block: 3 };
		assert_eq!(exit_code(&aborted, None), 130);
		assert_eq!(exit_code(&aborted, Some(143)), 143);
		let mismatch = SyncError::SizeMismatch { source_size: 1, target_size: 2 };
		assert_eq!(exit_code(&mismatch, Some(143)), 1);
	}

	#[test]
	fn test_serve_requires_role() {
		assert!(cli().try_get_matches_from(["blocksync", "serve", "-b", "4", "/dev/sdb"]).is_err());
		assert!(cli()
			.try_get_matches_from(["blocksync", "serve", "--role", "client", "-b", "4", "/dev/sdb"])
			.is_err());
	}

	#[test]
	fn test_serve_path_argument() {
		let matches = cli()
			.try_get_matches_from(["blocksync", "serve", "--role", "target", "-b", "1M", "/dev/sdb"])
			.unwrap();
		let (_, sub) = matches.subcommand().unwrap();
		assert_eq!(sub.get_one::<Role>("role"), Some(&Role::Target));
		assert_eq!(sub.get_one::<usize>("block-size"), Some(&(1 << 20)));
		assert_eq!(sub.get_one::<PathBuf>("path").map(PathBuf::as_path), Some(Path::new("/dev/sdb")));
	}
}

// vim: ts=4
