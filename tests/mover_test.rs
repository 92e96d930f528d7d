#![cfg(unix)]
/// rclone invocation contract, checked against a stand-in rclone script
///
/// Tests verify:
/// 1. Every call carries -v and the configured --modify-window, never --update
/// 2. Locations resolve to remote:path and absolute local paths
/// 3. lsjson output is parsed into entries
/// 4. Non-zero exits and missing binaries surface as typed errors
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use tidesync::error::MoverError;
use tidesync::mover::{DataMover, Location, RcloneMover};
use tidesync::types::{EntryKind, Side};

const LISTING: &str = r#"[{"Path":"docs","Name":"docs","Size":-1,"ModTime":"2024-05-01T08:00:00Z","IsDir":true},{"Path":"docs/readme.md","Name":"readme.md","Size":42,"ModTime":"2024-05-01T08:30:00.5Z","IsDir":false}]"#;

/// Writes a fake rclone that logs its arguments, one invocation per line.
/// Any argument containing "broken" makes it fail the way rclone does.
fn fake_rclone(dir: &Path) -> (PathBuf, PathBuf) {
	let log = dir.join("calls.log");
	let script = dir.join("rclone");
	let body = format!(
		r#"#!/bin/sh
echo "$@" >> "{log}"
for arg in "$@"; do
	case "$arg" in
		*broken*)
			echo "2024/05/01 08:00:00 ERROR : broken: directory not found" >&2
			echo "2024/05/01 08:00:00 Failed to copy: directory not found" >&2
			exit 3
			;;
	esac
done
case "$1" in
	version) echo "rclone v1.66.0" ;;
	lsjson) echo '{listing}' ;;
esac
exit 0
"#,
		log = log.display(),
		listing = LISTING
	);
	fs::write(&script, body).unwrap();
	fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
	(script, log)
}

fn logged_calls(log: &Path) -> Vec<String> {
	fs::read_to_string(log).unwrap_or_default().lines().map(str::to_string).collect()
}

fn mover(dir: &TempDir) -> (RcloneMover, PathBuf, PathBuf) {
	let (script, log) = fake_rclone(dir.path());
	let local = dir.path().join("local");
	fs::create_dir_all(&local).unwrap();
	let mover = RcloneMover::new(script.display().to_string(), "gdrive:Sync", &local, "2s")
		.with_args(vec!["--drive-skip-gdocs".to_string()]);
	(mover, log, local)
}

#[tokio::test]
async fn test_copy_carries_common_flags() {
	let dir = TempDir::new().unwrap();
	let (mover, log, local) = mover(&dir);

	mover
		.copy(&Location::new(Side::Local, "docs/a.txt"), &Location::new(Side::Remote, "docs/a.txt"))
		.await
		.unwrap();

	let calls = logged_calls(&log);
	assert_eq!(calls.len(), 1);
	let expected = format!(
		"copyto {}/docs/a.txt gdrive:Sync/docs/a.txt -v --modify-window=2s --drive-skip-gdocs",
		local.display()
	);
	assert_eq!(calls[0], expected);
	assert!(!calls[0].contains("--update"));
}

#[tokio::test]
async fn test_every_operation_uses_modify_window() {
	let dir = TempDir::new().unwrap();
	let (mover, log, _) = mover(&dir);

	mover.mkdir(&Location::new(Side::Remote, "new")).await.unwrap();
	mover.delete(&Location::new(Side::Remote, "old.txt")).await.unwrap();
	mover.rmdir(&Location::new(Side::Local, "empty")).await.unwrap();
	mover
		.move_to(&Location::new(Side::Local, "n.txt"), &Location::new(Side::Local, "n.local-conflict.txt"))
		.await
		.unwrap();
	mover.dedupe(Side::Remote).await.unwrap();

	let calls = logged_calls(&log);
	let verbs: Vec<&str> = calls.iter().filter_map(|c| c.split_whitespace().next()).collect();
	assert_eq!(verbs, vec!["mkdir", "deletefile", "rmdir", "moveto", "dedupe"]);
	assert!(calls.iter().all(|c| c.contains(" -v ") && c.contains("--modify-window=2s")));
	assert!(calls[4].starts_with("dedupe --dedupe-mode newest gdrive:Sync"));
}

#[tokio::test]
async fn test_list_parses_lsjson() {
	let dir = TempDir::new().unwrap();
	let (mover, log, _) = mover(&dir);

	let entries = mover.list(Side::Remote).await.unwrap();

	assert_eq!(entries.len(), 2);
	assert_eq!(entries[0].path, "docs");
	assert_eq!(entries[0].kind, EntryKind::Dir);
	assert_eq!(entries[1].path, "docs/readme.md");
	assert_eq!(entries[1].size, 42);
	assert!(logged_calls(&log)[0].starts_with("lsjson --recursive gdrive:Sync"));
}

#[tokio::test]
async fn test_failure_reports_last_stderr_line() {
	let dir = TempDir::new().unwrap();
	let (mover, _, _) = mover(&dir);

	let err = mover
		.copy(&Location::new(Side::Remote, "broken.txt"), &Location::new(Side::Local, "broken.txt"))
		.await
		.unwrap_err();

	match err {
		MoverError::Failed { operation, status, stderr } => {
			assert_eq!(operation, "copyto");
			assert_eq!(status, Some(3));
			assert!(stderr.contains("Failed to copy"));
		}
		other => panic!("unexpected error {:?}", other),
	}
}

#[tokio::test]
async fn test_version_probe() {
	let dir = TempDir::new().unwrap();
	let (mover, _, _) = mover(&dir);
	assert_eq!(mover.version().await.unwrap(), "rclone v1.66.0");

	let missing = RcloneMover::new(dir.path().join("no-such-rclone").display().to_string(), "gdrive:", "/tmp", "1s");
	assert!(matches!(missing.version().await, Err(MoverError::SpawnFailed { .. })));
}

// vim: ts=4
