//! Core data model: sides, observed entries, snapshots and change events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Which tree an observation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
	Local,
	Remote,
}

impl Side {
	/// The opposite side
	pub fn other(self) -> Side {
		match self {
			Side::Local => Side::Remote,
			Side::Remote => Side::Local,
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			Side::Local => "local",
			Side::Remote => "remote",
		}
	}
}

impl fmt::Display for Side {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
	File,
	Dir,
}

/// One observed item on one side at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
	/// Normalized path relative to the side's root
	pub path: String,
	pub side: Side,
	pub kind: EntryKind,
	pub size: u64,
	pub mtime: DateTime<Utc>,
	/// Content hash when the side can provide one
	pub fingerprint: Option<String>,
}

impl FileEntry {
	pub fn file(path: impl Into<String>, side: Side, size: u64, mtime: DateTime<Utc>) -> Self {
		FileEntry { path: path.into(), side, kind: EntryKind::File, size, mtime, fingerprint: None }
	}

	pub fn dir(path: impl Into<String>, side: Side, mtime: DateTime<Utc>) -> Self {
		FileEntry { path: path.into(), side, kind: EntryKind::Dir, size: 0, mtime, fingerprint: None }
	}

	pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
		self.fingerprint = Some(fingerprint.into());
		self
	}

	pub fn is_dir(&self) -> bool {
		self.kind == EntryKind::Dir
	}

	/// Whether two observations describe the same item within `window`.
	///
	/// Directories match whenever both sides hold a directory. Files match on
	/// equal fingerprints when both carry one, otherwise on equal size and
	/// modification times at most `window` apart.
	pub fn matches(&self, other: &FileEntry, window: Duration) -> bool {
		if self.kind != other.kind {
			return false;
		}
		if self.is_dir() {
			return true;
		}
		if let (Some(a), Some(b)) = (&self.fingerprint, &other.fingerprint) {
			return a == b;
		}
		self.size == other.size && within_window(self.mtime, other.mtime, window)
	}
}

/// True when `a` and `b` are at most `window` apart (inclusive)
pub fn within_window(a: DateTime<Utc>, b: DateTime<Utc>, window: Duration) -> bool {
	let delta = if a > b { a - b } else { b - a };
	match delta.to_std() {
		Ok(delta) => delta <= window,
		Err(_) => false,
	}
}

/// Full view of one side, keyed by normalized path
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
	side: Side,
	entries: BTreeMap<String, FileEntry>,
}

impl Snapshot {
	pub fn new(side: Side) -> Self {
		Snapshot { side, entries: BTreeMap::new() }
	}

	/// Build a snapshot, later entries for the same path replace earlier ones
	pub fn from_entries(side: Side, entries: impl IntoIterator<Item = FileEntry>) -> Self {
		let mut snapshot = Snapshot::new(side);
		for entry in entries {
			snapshot.insert(entry);
		}
		snapshot
	}

	pub fn side(&self) -> Side {
		self.side
	}

	pub fn get(&self, path: &str) -> Option<&FileEntry> {
		self.entries.get(path)
	}

	pub fn contains(&self, path: &str) -> bool {
		self.entries.contains_key(path)
	}

	/// Insert an entry, re-tagging it with this snapshot's side
	pub fn insert(&mut self, mut entry: FileEntry) -> Option<FileEntry> {
		entry.side = self.side;
		self.entries.insert(entry.path.clone(), entry)
	}

	pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
		self.entries.remove(path)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
		self.entries.values()
	}

	pub fn paths(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(|p| p.as_str())
	}

	/// `path` itself and every entry beneath it
	pub fn paths_under(&self, path: &str) -> Vec<String> {
		let prefix = format!("{}/", path);
		self.entries
			.range(path.to_string()..)
			.take_while(|(p, _)| p.as_str() == path || p.starts_with(&prefix) || p.as_str() < prefix.as_str())
			.filter(|(p, _)| p.as_str() == path || p.starts_with(&prefix))
			.map(|(p, _)| p.clone())
			.collect()
	}

	/// Changes that turn `self` into `newer`, comparing with `window` tolerance
	pub fn diff(&self, newer: &Snapshot, window: Duration) -> Vec<ChangeEvent> {
		let now = Instant::now();
		let mut events = Vec::new();

		for entry in newer.iter() {
			match self.get(&entry.path) {
				None => events.push(ChangeEvent::at(&entry.path, newer.side, ChangeKind::Created, now)),
				Some(old) if !old.matches(entry, window) => {
					events.push(ChangeEvent::at(&entry.path, newer.side, ChangeKind::Modified, now))
				}
				Some(_) => {}
			}
		}
		for path in self.paths() {
			if !newer.contains(path) {
				events.push(ChangeEvent::at(path, newer.side, ChangeKind::Deleted, now));
			}
		}

		events
	}
}

/// Latest snapshot of both sides, swapped wholesale on every refresh
#[derive(Debug, Clone)]
pub struct Snapshots {
	pub local: Arc<Snapshot>,
	pub remote: Arc<Snapshot>,
}

impl Snapshots {
	pub fn new(local: Arc<Snapshot>, remote: Arc<Snapshot>) -> Self {
		Snapshots { local, remote }
	}

	pub fn get(&self, side: Side) -> &Snapshot {
		match side {
			Side::Local => &self.local,
			Side::Remote => &self.remote,
		}
	}

	pub fn replace(&mut self, snapshot: Arc<Snapshot>) {
		match snapshot.side() {
			Side::Local => self.local = snapshot,
			Side::Remote => self.remote = snapshot,
		}
	}

	/// Whether either side holds `path`
	pub fn contains(&self, path: &str) -> bool {
		self.local.contains(path) || self.remote.contains(path)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
	Created,
	Modified,
	Deleted,
}

/// Raw change notification from the watcher or the poller
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
	pub path: String,
	pub side: Side,
	pub kind: ChangeKind,
	pub observed: Instant,
}

impl ChangeEvent {
	pub fn new(path: impl Into<String>, side: Side, kind: ChangeKind) -> Self {
		Self::at(path, side, kind, Instant::now())
	}

	pub fn at(path: impl Into<String>, side: Side, kind: ChangeKind, observed: Instant) -> Self {
		ChangeEvent { path: path.into(), side, kind, observed }
	}
}

impl fmt::Display for ChangeEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {:?} {}", self.side, self.kind, self.path)
	}
}


// vim: ts=4
