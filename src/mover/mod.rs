//! Interface to the external data-mover
//!
//! The sync engine never touches file contents itself. Listing, copying,
//! moving and deleting are delegated to an implementation of [`DataMover`],
//! normally [`RcloneMover`].

use async_trait::async_trait;
use std::fmt;

use crate::error::MoverError;
use crate::types::{FileEntry, Side};

mod rclone;

pub use rclone::{parse_listing, RcloneMover};

/// Result type for data-mover operations
pub type MoverResult<T> = Result<T, MoverError>;

/// A path on one side, relative to that side's root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
	pub side: Side,
	pub path: String,
}

impl Location {
	pub fn new(side: Side, path: impl Into<String>) -> Self {
		Location { side, path: path.into() }
	}
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.side, self.path)
	}
}

/// Operations the sync engine needs from the external data-mover.
///
/// Every call is independent and awaited for success or failure. The
/// implementation applies the configured modify-window to each call so its
/// own timestamp comparison agrees with the reconciler's.
#[async_trait]
pub trait DataMover: Send + Sync {
	/// Recursive listing of one side's root
	async fn list(&self, side: Side) -> MoverResult<Vec<FileEntry>>;

	/// Copy a file, creating parent directories at the destination
	async fn copy(&self, from: &Location, to: &Location) -> MoverResult<()>;

	/// Move or rename a file
	async fn move_to(&self, from: &Location, to: &Location) -> MoverResult<()>;

	/// Create a directory
	async fn mkdir(&self, at: &Location) -> MoverResult<()>;

	/// Delete a single file
	async fn delete(&self, at: &Location) -> MoverResult<()>;

	/// Remove an empty directory; fails when it still has content
	async fn rmdir(&self, at: &Location) -> MoverResult<()>;

	/// Collapse duplicate names on one side, keeping the newest
	async fn dedupe(&self, side: Side) -> MoverResult<()>;

	/// Version string of the data-mover, used as a startup probe
	async fn version(&self) -> MoverResult<String>;
}

/// Append a relative path to a root such as `gdrive:Sync` or `/home/me/gdrive`
pub fn join_root(root: &str, path: &str) -> String {
	if path.is_empty() {
		root.to_string()
	} else if root.ends_with(':') || root.ends_with('/') {
		format!("{}{}", root, path)
	} else {
		format!("{}/{}", root, path)
	}
}


// vim: ts=4
