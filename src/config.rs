//! Configuration for the sync process
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`Config::new`)
//! 2. Config file (`--config path.toml`)
//! 3. CLI flags (highest priority)

use crate::error::ConfigError;
use crate::util::{format_duration, parse_duration};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BATCH_COOLDOWN: Duration = Duration::from_secs(1);
pub const DEFAULT_MODIFY_WINDOW: &str = "1s";
pub const DEFAULT_TRANSFERS: usize = 4;

/// Timestamp tolerance, kept both as the text handed to rclone verbatim and
/// as the parsed value the reconciler compares with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModifyWindow {
	raw: String,
	duration: Duration,
}

impl ModifyWindow {
	pub fn parse(raw: &str) -> Result<Self, ConfigError> {
		let duration = parse_duration(raw).map_err(|message| ConfigError::InvalidDuration {
			option: "--modify-window".to_string(),
			value: raw.to_string(),
			message,
		})?;
		Ok(ModifyWindow { raw: raw.trim().to_string(), duration })
	}

	/// Text passed to rclone's `--modify-window`
	pub fn as_str(&self) -> &str {
		&self.raw
	}

	pub fn duration(&self) -> Duration {
		self.duration
	}
}

impl Default for ModifyWindow {
	fn default() -> Self {
		ModifyWindow { raw: DEFAULT_MODIFY_WINDOW.to_string(), duration: Duration::from_secs(1) }
	}
}

impl TryFrom<String> for ModifyWindow {
	type Error = String;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		ModifyWindow::parse(&value).map_err(|e| e.to_string())
	}
}

impl From<ModifyWindow> for String {
	fn from(window: ModifyWindow) -> Self {
		window.raw
	}
}

/// Runtime configuration of one local/remote pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Fully-qualified rclone remote path, e.g. `gdrive:Sync`
	pub remote_path: String,

	/// Local directory kept in sync with the remote
	pub local_path: PathBuf,

	/// Interval between remote listings
	#[serde(with = "duration_text")]
	pub poll_interval: Duration,

	/// Maximum timestamp difference still considered equal
	pub modify_window: ModifyWindow,

	/// Quiet period after the last change before a batch is reconciled
	#[serde(with = "duration_text")]
	pub batch_cooldown: Duration,

	/// Maximum number of concurrent data-mover invocations
	pub transfers: usize,

	/// rclone executable
	pub rclone: String,

	/// Extra flags appended to every rclone invocation
	pub rclone_args: Vec<String>,

	/// Glob patterns excluded on both sides
	pub exclude_patterns: Vec<String>,

	/// Run `rclone dedupe --dedupe-mode newest` on the remote before each cycle and after each sync
	pub dedupe: bool,

	/// Plan and log, but never transfer
	pub dry_run: bool,

	/// Default log level when RUST_LOG is unset
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			remote_path: String::new(),
			local_path: PathBuf::new(),
			poll_interval: DEFAULT_POLL_INTERVAL,
			modify_window: ModifyWindow::default(),
			batch_cooldown: DEFAULT_BATCH_COOLDOWN,
			transfers: DEFAULT_TRANSFERS,
			rclone: "rclone".to_string(),
			rclone_args: vec![],
			exclude_patterns: vec![],
			dedupe: false,
			dry_run: false,
			log_level: "info".to_string(),
		}
	}
}

impl Config {
	pub fn new(remote_path: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
		Config { remote_path: remote_path.into(), local_path: local_path.into(), ..Default::default() }
	}

	/// Load a TOML configuration file
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileLoad {
			path: path.display().to_string(),
			message: e.to_string(),
		})?;
		Self::from_toml(&contents).map_err(|e| match e {
			ConfigError::FileLoad { message, .. } => {
				ConfigError::FileLoad { path: path.display().to_string(), message }
			}
			other => other,
		})
	}

	pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
		toml::from_str(contents).map_err(|e| ConfigError::FileLoad {
			path: "<inline>".to_string(),
			message: e.to_string(),
		})
	}

	/// Check the configuration and canonicalize the local root.
	///
	/// Everything here is fatal: the process must not enter its startup
	/// cycle with a configuration that fails validation.
	pub fn validate(&mut self) -> Result<(), ConfigError> {
		validate_remote(&self.remote_path)?;

		let local = self.local_path.display().to_string();
		let meta = std::fs::metadata(&self.local_path).map_err(|e| ConfigError::InvalidPath {
			path: local.clone(),
			message: e.to_string(),
		})?;
		if !meta.is_dir() {
			return Err(ConfigError::InvalidPath { path: local, message: "not a directory".to_string() });
		}
		self.local_path = std::fs::canonicalize(&self.local_path)
			.map_err(|e| ConfigError::InvalidPath { path: local, message: e.to_string() })?;

		if self.poll_interval.is_zero() {
			return Err(ConfigError::InvalidValue {
				option: "--poll-interval".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}
		if self.transfers == 0 {
			return Err(ConfigError::InvalidValue {
				option: "--transfers".to_string(),
				message: "must be at least 1".to_string(),
			});
		}
		if self.rclone.trim().is_empty() {
			return Err(ConfigError::InvalidValue {
				option: "--rclone".to_string(),
				message: "executable name is empty".to_string(),
			});
		}

		Ok(())
	}
}

/// Parse a duration option, naming the option in the error
pub fn parse_duration_option(option: &str, value: &str) -> Result<Duration, ConfigError> {
	parse_duration(value).map_err(|message| ConfigError::InvalidDuration {
		option: option.to_string(),
		value: value.to_string(),
		message,
	})
}

/// rclone remotes look like `name:path` or `:backend:path`
fn validate_remote(remote: &str) -> Result<(), ConfigError> {
	let invalid = |message: &str| ConfigError::InvalidRemote {
		remote: remote.to_string(),
		message: message.to_string(),
	};

	if remote.trim().is_empty() {
		return Err(invalid("remote path is empty"));
	}
	let colon = remote.find(':').ok_or_else(|| invalid("expected the form name:path"))?;
	let name = &remote[..colon];
	if name.contains('/') || name.contains('\\') {
		return Err(invalid("remote name must not contain path separators"));
	}
	Ok(())
}

mod duration_text {
	use super::{format_duration, parse_duration};
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&format_duration(*duration))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		let text = String::deserialize(deserializer)?;
		parse_duration(&text).map_err(serde::de::Error::custom)
	}
}


// vim: ts=4
