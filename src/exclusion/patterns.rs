//! Pattern-based path exclusion using glob patterns

use crate::error::ConfigError;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Matches normalized relative paths against built-in and user globs
#[derive(Debug, Clone)]
pub struct PatternMatcher {
	/// Compiled user exclusion patterns
	exclude_set: GlobSet,

	/// Always-excluded patterns (built-in)
	always_exclude: GlobSet,
}

impl PatternMatcher {
	pub fn new(exclude_patterns: &[String]) -> Result<Self, ConfigError> {
		let always_exclude = Self::build_always_excluded()?;
		let exclude_set = Self::build_glob_set(exclude_patterns)?;
		Ok(Self { exclude_set, always_exclude })
	}

	/// Matcher with only the built-in exclusions
	pub fn builtin() -> Result<Self, ConfigError> {
		Self::new(&[])
	}

	fn build_always_excluded() -> Result<GlobSet, ConfigError> {
		let patterns = vec![
			"**/*.partial",   // rclone in-flight transfers
			".Trash-*",       // Linux trash
			"lost+found",     // Linux filesystem recovery
			"**/.DS_Store",   // macOS cruft
			"**/Thumbs.db",   // Windows cruft
			"**/desktop.ini", // Windows cruft
			"**/*.swp",       // Vim swap files
			"**/*.swo",       // Vim swap files
			"**/*~",          // Editor backups
			"**/.~lock.*#",   // LibreOffice locks
			"**/.nfs*",       // NFS temp files
		];

		Self::build_glob_set(&patterns.into_iter().map(String::from).collect::<Vec<_>>())
	}

	fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ConfigError> {
		let mut builder = GlobSetBuilder::new();

		for pattern in patterns {
			let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
				pattern: pattern.clone(),
				message: e.to_string(),
			})?;
			builder.add(glob);
		}

		builder.build().map_err(|e| ConfigError::InvalidPattern {
			pattern: patterns.join(", "),
			message: e.to_string(),
		})
	}

	/// Check whether a normalized path, or any directory above it, is excluded
	pub fn is_excluded(&self, path: &str) -> bool {
		let mut end = path.len();
		loop {
			let candidate = &path[..end];
			if self.always_exclude.is_match(candidate) || self.exclude_set.is_match(candidate) {
				return true;
			}
			match candidate.rfind('/') {
				Some(i) => end = i,
				None => return false,
			}
		}
	}
}


// vim: ts=4
