//! Conflict detection and resolution

use crate::types::FileEntry;
use std::fmt;

pub mod markers;
pub mod resolver;

pub use resolver::ConflictResolver;

/// A path changed on both sides since the last converged state
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
	/// Normalized path both sides disagree on
	pub path: String,

	/// Local entry, `None` when deleted locally
	pub local: Option<FileEntry>,

	/// Remote entry, `None` when deleted remotely
	pub remote: Option<FileEntry>,

	/// Type of conflict
	pub conflict_type: ConflictType,

	/// Outcome chosen by the resolver
	pub resolution: Resolution,
}

impl ConflictRecord {
	pub fn new(path: impl Into<String>, local: Option<FileEntry>, remote: Option<FileEntry>) -> Self {
		let conflict_type = ConflictType::classify(local.as_ref(), remote.as_ref());
		ConflictRecord { path: path.into(), local, remote, conflict_type, resolution: Resolution::Pending }
	}

	pub fn with_type(mut self, conflict_type: ConflictType) -> Self {
		self.conflict_type = conflict_type;
		self
	}
}

/// Types of conflicts that can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
	/// File modified differently on both sides
	ModifyModify,

	/// File deleted on one side, modified on the other
	DeleteModify,

	/// File created with different content on both sides
	CreateCreate,

	/// File vs directory conflict
	TypeMismatch,
}

impl ConflictType {
	/// Type of a conflict between two resulting entries. Both-present
	/// conflicts default to `ModifyModify`; the reconciler refines creations.
	pub fn classify(local: Option<&FileEntry>, remote: Option<&FileEntry>) -> Self {
		match (local, remote) {
			(Some(l), Some(r)) if l.kind != r.kind => ConflictType::TypeMismatch,
			(Some(_), Some(_)) => ConflictType::ModifyModify,
			_ => ConflictType::DeleteModify,
		}
	}
}

impl fmt::Display for ConflictType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ConflictType::ModifyModify => "modify/modify",
			ConflictType::DeleteModify => "delete/modify",
			ConflictType::CreateCreate => "create/create",
			ConflictType::TypeMismatch => "file/directory",
		};
		f.write_str(name)
	}
}

/// How a conflict was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
	/// Not resolved yet
	Pending,

	/// Every surviving variant kept under a marker name on both sides
	KeepBoth {
		/// Marker name the local variant moves to
		local_marker: Option<String>,
		/// Marker name the remote variant moves to
		remote_marker: Option<String>,
	},
}


// vim: ts=4
