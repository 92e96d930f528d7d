//! Error types for tidesync operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for sync operations
#[derive(Debug)]
pub enum SyncError {
	/// Remote unreachable during a poll or a transfer; retried on the next cycle
	Transport { operation: String, message: String },

	/// Local filesystem failure on a single path
	LocalIo { path: String, message: String },

	/// Startup configuration is unusable
	Config(ConfigError),

	/// A conflict resolution tried to break the no-delete rule
	ConflictPolicy { path: String, message: String },

	/// Filesystem notification setup failed
	Watch { message: String },

	/// I/O error
	Io(io::Error),

	/// Generic error message
	Other { message: String },
}

impl SyncError {
	/// Whether the next poll or cycle is expected to retry this naturally
	pub fn is_transient(&self) -> bool {
		matches!(self, SyncError::Transport { .. } | SyncError::LocalIo { .. })
	}

	/// Whether the process must exit before entering its sync loop
	pub fn is_fatal(&self) -> bool {
		matches!(self, SyncError::Config(_) | SyncError::Watch { .. })
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Transport { operation, message } => {
				write!(f, "Transport error during {}: {}", operation, message)
			}
			SyncError::LocalIo { path, message } => {
				write!(f, "Local I/O error on {}: {}", path, message)
			}
			SyncError::Config(e) => write!(f, "Configuration error: {}", e),
			SyncError::ConflictPolicy { path, message } => {
				write!(f, "Conflict policy violation on {}: {}", path, message)
			}
			SyncError::Watch { message } => write!(f, "Watch error: {}", message),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Config(e) => Some(e),
			SyncError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<ConfigError> for SyncError {
	fn from(e: ConfigError) -> Self {
		SyncError::Config(e)
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

impl From<notify::Error> for SyncError {
	fn from(e: notify::Error) -> Self {
		SyncError::Watch { message: e.to_string() }
	}
}

/// Startup configuration errors, all fatal
#[derive(Debug)]
pub enum ConfigError {
	/// The external data-mover could not be run
	MissingTool { tool: String, message: String },

	/// Local root missing or not a directory
	InvalidPath { path: String, message: String },

	/// Remote path is not a usable remote
	InvalidRemote { remote: String, message: String },

	/// Remote could not be listed at startup
	RemoteUnreachable { remote: String, message: String },

	/// A duration option could not be parsed
	InvalidDuration { option: String, value: String, message: String },

	/// Exclusion glob failed to compile
	InvalidPattern { pattern: String, message: String },

	/// Any other out-of-range option
	InvalidValue { option: String, message: String },

	/// Configuration file could not be read or parsed
	FileLoad { path: String, message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::MissingTool { tool, message } => {
				write!(f, "Cannot run '{}' ({}). Is it installed and on PATH?", tool, message)
			}
			ConfigError::InvalidPath { path, message } => {
				write!(f, "Invalid local path {}: {}", path, message)
			}
			ConfigError::InvalidRemote { remote, message } => {
				write!(f, "Invalid remote {}: {}", remote, message)
			}
			ConfigError::RemoteUnreachable { remote, message } => {
				write!(f, "Remote {} is unreachable: {}", remote, message)
			}
			ConfigError::InvalidDuration { option, value, message } => {
				write!(f, "Invalid duration '{}' for {}: {}", value, option, message)
			}
			ConfigError::InvalidPattern { pattern, message } => {
				write!(f, "Invalid exclude pattern {}: {}", pattern, message)
			}
			ConfigError::InvalidValue { option, message } => {
				write!(f, "Invalid value for {}: {}", option, message)
			}
			ConfigError::FileLoad { path, message } => {
				write!(f, "Cannot load config file {}: {}", path, message)
			}
		}
	}
}

impl Error for ConfigError {}

/// Errors reported by the external data-mover
#[derive(Debug)]
pub enum MoverError {
	/// The data-mover process could not be started
	SpawnFailed { cmd: String, source: io::Error },

	/// The data-mover ran and reported failure
	Failed { operation: String, status: Option<i32>, stderr: String },

	/// A listing could not be parsed
	InvalidListing { message: String },

	/// Path not present where the operation expected it
	NotFound { path: String },
}

impl fmt::Display for MoverError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MoverError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			MoverError::Failed { operation, status, stderr } => match status {
				Some(code) => write!(f, "{} failed with exit code {}: {}", operation, code, stderr),
				None => write!(f, "{} was terminated by a signal: {}", operation, stderr),
			},
			MoverError::InvalidListing { message } => write!(f, "Invalid listing: {}", message),
			MoverError::NotFound { path } => write!(f, "Not found: {}", path),
		}
	}
}

impl Error for MoverError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			MoverError::SpawnFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}


// vim: ts=4
