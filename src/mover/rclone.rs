//! rclone-backed data-mover
//!
//! Each operation spawns one rclone process. Every invocation carries `-v`,
//! `--modify-window` with the configured text and any extra user flags.
//! rclone's stderr is forwarded to the log at debug level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::{join_root, DataMover, Location, MoverResult};
use crate::config::Config;
use crate::error::MoverError;
use crate::logging::*;
use crate::types::{FileEntry, Side};
use crate::util::normalize_path;

/// Hash types preferred as fingerprints, in order
const FINGERPRINT_HASHES: &[&str] = &["md5", "sha1", "sha256", "quickxor", "dropbox"];

/// One item of `rclone lsjson` output
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsJsonItem {
	path: String,
	#[serde(default)]
	size: i64,
	mod_time: DateTime<Utc>,
	#[serde(default)]
	is_dir: bool,
	#[serde(default)]
	hashes: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct RcloneMover {
	rclone: String,
	remote_root: String,
	local_root: PathBuf,
	modify_window: String,
	extra_args: Vec<String>,
}

impl RcloneMover {
	pub fn new(
		rclone: impl Into<String>,
		remote_root: impl Into<String>,
		local_root: impl Into<PathBuf>,
		modify_window: impl Into<String>,
	) -> Self {
		RcloneMover {
			rclone: rclone.into(),
			remote_root: remote_root.into(),
			local_root: local_root.into(),
			modify_window: modify_window.into(),
			extra_args: vec![],
		}
	}

	pub fn from_config(config: &Config) -> Self {
		Self::new(
			&config.rclone,
			&config.remote_path,
			&config.local_path,
			config.modify_window.as_str(),
		)
		.with_args(config.rclone_args.clone())
	}

	/// Extra flags appended to every invocation
	pub fn with_args(mut self, args: Vec<String>) -> Self {
		self.extra_args = args;
		self
	}

	fn root(&self, side: Side) -> String {
		match side {
			Side::Local => self.local_root.display().to_string(),
			Side::Remote => self.remote_root.clone(),
		}
	}

	fn resolve(&self, location: &Location) -> String {
		join_root(&self.root(location.side), &location.path)
	}

	/// Arguments of one invocation, common flags included
	pub fn command_args(&self, args: &[String]) -> Vec<String> {
		let mut full = args.to_vec();
		full.push("-v".to_string());
		full.push(format!("--modify-window={}", self.modify_window));
		full.extend(self.extra_args.iter().cloned());
		full
	}

	async fn run(&self, operation: &str, args: Vec<String>) -> MoverResult<String> {
		let args = self.command_args(&args);
		debug!("{} {}", self.rclone, args.join(" "));

		let output = Command::new(&self.rclone)
			.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.output()
			.await
			.map_err(|e| MoverError::SpawnFailed { cmd: format!("{} {}", self.rclone, operation), source: e })?;

		let stderr = String::from_utf8_lossy(&output.stderr);
		for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
			debug!("rclone {}: {}", operation, line);
		}

		if !output.status.success() {
			return Err(MoverError::Failed {
				operation: operation.to_string(),
				status: output.status.code(),
				stderr: last_error_line(&stderr),
			});
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

#[async_trait]
impl DataMover for RcloneMover {
	async fn list(&self, side: Side) -> MoverResult<Vec<FileEntry>> {
		let root = self.root(side);
		let stdout = self.run("lsjson", vec!["lsjson".into(), "--recursive".into(), root]).await?;
		parse_listing(side, &stdout)
	}

	async fn copy(&self, from: &Location, to: &Location) -> MoverResult<()> {
		self.run("copyto", vec!["copyto".into(), self.resolve(from), self.resolve(to)]).await?;
		Ok(())
	}

	async fn move_to(&self, from: &Location, to: &Location) -> MoverResult<()> {
		self.run("moveto", vec!["moveto".into(), self.resolve(from), self.resolve(to)]).await?;
		Ok(())
	}

	async fn mkdir(&self, at: &Location) -> MoverResult<()> {
		self.run("mkdir", vec!["mkdir".into(), self.resolve(at)]).await?;
		Ok(())
	}

	async fn delete(&self, at: &Location) -> MoverResult<()> {
		self.run("deletefile", vec!["deletefile".into(), self.resolve(at)]).await?;
		Ok(())
	}

	async fn rmdir(&self, at: &Location) -> MoverResult<()> {
		self.run("rmdir", vec!["rmdir".into(), self.resolve(at)]).await?;
		Ok(())
	}

	async fn dedupe(&self, side: Side) -> MoverResult<()> {
		let root = self.root(side);
		self.run("dedupe", vec!["dedupe".into(), "--dedupe-mode".into(), "newest".into(), root]).await?;
		Ok(())
	}

	async fn version(&self) -> MoverResult<String> {
		let output = Command::new(&self.rclone)
			.arg("version")
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.output()
			.await
			.map_err(|e| MoverError::SpawnFailed { cmd: format!("{} version", self.rclone), source: e })?;

		if !output.status.success() {
			return Err(MoverError::Failed {
				operation: "version".to_string(),
				status: output.status.code(),
				stderr: last_error_line(&String::from_utf8_lossy(&output.stderr)),
			});
		}

		let stdout = String::from_utf8_lossy(&output.stdout);
		Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
	}
}

/// Parse `rclone lsjson --recursive` output into entries for `side`
pub fn parse_listing(side: Side, json: &str) -> MoverResult<Vec<FileEntry>> {
	let items: Vec<LsJsonItem> = serde_json::from_str(json)
		.map_err(|e| MoverError::InvalidListing { message: e.to_string() })?;

	let mut entries = Vec::with_capacity(items.len());
	for item in items {
		let Some(path) = normalize_path(&item.path) else {
			warn!("Skipping unusable listing path '{}'", item.path);
			continue;
		};
		let entry = if item.is_dir {
			FileEntry::dir(path, side, item.mod_time)
		} else {
			let entry = FileEntry::file(path, side, item.size.max(0) as u64, item.mod_time);
			match item.hashes.as_ref().and_then(fingerprint) {
				Some(fp) => entry.with_fingerprint(fp),
				None => entry,
			}
		};
		entries.push(entry);
	}
	Ok(entries)
}

fn fingerprint(hashes: &BTreeMap<String, String>) -> Option<String> {
	FINGERPRINT_HASHES.iter().find_map(|name| {
		hashes.get(*name).filter(|h| !h.is_empty()).map(|h| format!("{}:{}", name, h))
	})
}

/// Last meaningful stderr line, rclone's summary of what went wrong
fn last_error_line(stderr: &str) -> String {
	stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default().to_string()
}


// vim: ts=4
