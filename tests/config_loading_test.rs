/// Integration tests for config loading
/// Tests that config files are read, merged over defaults and validated
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use blocksync::connection::{endpoint_command, Location};
use blocksync::{DigestAlgorithm, Role, SyncConfig, SyncError};

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
	let path = dir.path().join("config.toml");
	fs::write(&path, content).unwrap();
	path
}

#[test]
fn test_full_config_file() {
	let dir = TempDir::new().unwrap();
	let path = write_config(
		&dir,
		r#"
block-size = 4194304
digest = "blake3"
compress = true
cipher = "chacha20-poly1305@openssh.com"
ssh-command = "/usr/bin/ssh"
ssh-args = ["-o", "BatchMode=yes"]
remote-command = "/opt/blocksync/bin/blocksync"
timeout-secs = 120
progress = true
"#,
	);

	let config = SyncConfig::from_file(&path).unwrap();
	assert_eq!(config.block_size, 4 * 1024 * 1024);
	assert_eq!(config.digest, DigestAlgorithm::Blake3);
	assert!(config.compress);
	assert!(config.progress);
	assert!(!config.verbose);
	assert_eq!(config.timeout_secs, Some(120));
	assert!(config.validate().is_ok());
}

#[test]
fn test_config_drives_remote_command_line() {
	let dir = TempDir::new().unwrap();
	let path = write_config(
		&dir,
		r#"
compress = true
ssh-args = ["-o", "BatchMode=yes"]
remote-command = "/opt/blocksync/bin/blocksync"
"#,
	);
	let config = SyncConfig::from_file(&path).unwrap();
	let location = Location::parse("admin@backup:/dev/sdb").unwrap();

	let command = endpoint_command(&location, Role::Target, &config).unwrap();
	assert_eq!(
		command.to_string(),
		"ssh -C -l admin -o BatchMode=yes backup /opt/blocksync/bin/blocksync serve \
		 --role target --block-size 1048576 --digest sha1 /dev/sdb"
	);
}

#[test]
fn test_unknown_digest_rejected() {
	let dir = TempDir::new().unwrap();
	let path = write_config(&dir, "digest = \"md5\"\n");
	assert!(matches!(SyncConfig::from_file(&path), Err(SyncError::InvalidConfig { .. })));
}

#[test]
fn test_explicit_missing_file_is_an_error() {
	let dir = TempDir::new().unwrap();
	let missing = dir.path().join("nope.toml");
	assert!(matches!(SyncConfig::load(Some(&missing)), Err(SyncError::InvalidConfig { .. })));
}

#[test]
fn test_zero_block_size_fails_validation() {
	let dir = TempDir::new().unwrap();
	let path = write_config(&dir, "block-size = 0\n");
	let config = SyncConfig::from_file(&path).unwrap();
	assert!(matches!(config.validate(), Err(SyncError::InvalidConfig { .. })));
}

// vim: ts=4
