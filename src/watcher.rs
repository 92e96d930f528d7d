//! Local watcher: keeps the local snapshot current from filesystem notifications
//!
//! Notifications only say *where* something happened. Every reported path is
//! re-examined on disk and compared with the previous snapshot entry to decide
//! whether it was created, modified or deleted. A directory that appears is
//! walked so its whole content is recorded.

use chrono::{DateTime, Utc};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::SyncError;
use crate::exclusion::PatternMatcher;
use crate::logging::*;
use crate::scheduler::Message;
use crate::types::{ChangeEvent, ChangeKind, FileEntry, Side, Snapshot};
use crate::util::relative_path;

/// Full recursive scan of the local root. Symlinks and special files are skipped.
pub fn scan_local(root: &Path, matcher: &PatternMatcher) -> io::Result<Snapshot> {
	let mut entries = Vec::new();
	walk(root, None, matcher, &mut entries)?;
	Ok(Snapshot::from_entries(Side::Local, entries))
}

/// Collect the entries below `start` (the root when `None`)
fn walk(
	root: &Path,
	start: Option<&str>,
	matcher: &PatternMatcher,
	out: &mut Vec<FileEntry>,
) -> io::Result<()> {
	let mut stack = vec![start.map(String::from)];

	while let Some(dir) = stack.pop() {
		let abs = match &dir {
			Some(rel) => root.join(rel),
			None => root.to_path_buf(),
		};
		let reader = match fs::read_dir(&abs) {
			Ok(reader) => reader,
			Err(e) if dir.is_none() => return Err(e),
			Err(e) => {
				warn!("Cannot read {}: {}", abs.display(), e);
				continue;
			}
		};

		for item in reader {
			let item = match item {
				Ok(item) => item,
				Err(e) => {
					warn!("Cannot read entry in {}: {}", abs.display(), e);
					continue;
				}
			};
			let name = item.file_name().to_string_lossy().into_owned();
			let rel = match &dir {
				Some(parent) => format!("{}/{}", parent, name),
				None => name,
			};
			if matcher.is_excluded(&rel) {
				trace!("Excluded {}", rel);
				continue;
			}
			// DirEntry::metadata does not follow symlinks
			let meta = match item.metadata() {
				Ok(meta) => meta,
				Err(e) => {
					debug!("{} vanished during scan: {}", rel, e);
					continue;
				}
			};
			if let Some(entry) = entry_from_metadata(&rel, &meta) {
				if entry.is_dir() {
					stack.push(Some(rel));
				}
				out.push(entry);
			}
		}
	}

	Ok(())
}

fn entry_from_metadata(rel: &str, meta: &fs::Metadata) -> Option<FileEntry> {
	let mtime: DateTime<Utc> = match meta.modified() {
		Ok(t) => t.into(),
		Err(e) => {
			warn!("No modification time for {}: {}", rel, e);
			return None;
		}
	};
	if meta.is_dir() {
		Some(FileEntry::dir(rel, Side::Local, mtime))
	} else if meta.is_file() {
		Some(FileEntry::file(rel, Side::Local, meta.len(), mtime))
	} else {
		None
	}
}

pub struct LocalWatcher {
	root: PathBuf,
	matcher: PatternMatcher,
	snapshot: Arc<Snapshot>,
	_watcher: RecommendedWatcher,
	events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl LocalWatcher {
	/// Start receiving notifications for `root`.
	///
	/// Call before the initial scan so nothing changing during the scan is missed.
	pub fn subscribe(root: impl Into<PathBuf>, matcher: PatternMatcher) -> Result<Self, SyncError> {
		let root = root.into();
		let (event_tx, events) = mpsc::unbounded_channel::<notify::Result<Event>>();
		let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
			let _ = event_tx.send(event);
		})?;
		watcher.watch(&root, RecursiveMode::Recursive)?;
		debug!("Watching {}", root.display());

		Ok(LocalWatcher {
			root,
			matcher,
			snapshot: Arc::new(Snapshot::new(Side::Local)),
			_watcher: watcher,
			events,
		})
	}

	/// Scan the whole root and make it the current snapshot
	pub async fn initial_scan(&mut self) -> Result<Arc<Snapshot>, SyncError> {
		let root = self.root.clone();
		let matcher = self.matcher.clone();
		let snapshot = tokio::task::spawn_blocking(move || scan_local(&root, &matcher))
			.await
			.map_err(|e| SyncError::Other { message: format!("Local scan task failed: {}", e) })?
			.map_err(|e| SyncError::LocalIo { path: self.root.display().to_string(), message: e.to_string() })?;

		info!("Local scan: {} entries under {}", snapshot.len(), self.root.display());
		self.snapshot = Arc::new(snapshot);
		Ok(self.snapshot.clone())
	}

	pub fn snapshot(&self) -> Arc<Snapshot> {
		self.snapshot.clone()
	}

	/// Re-examine the given absolute paths and swap in the updated snapshot
	pub fn refresh(&mut self, raw_paths: &[PathBuf]) -> Vec<ChangeEvent> {
		let now = Instant::now();
		let mut next = (*self.snapshot).clone();
		let mut changes = Vec::new();
		let mut seen = BTreeSet::new();

		for raw in raw_paths {
			let Some(rel) = relative_path(&self.root, raw) else {
				continue;
			};
			if !seen.insert(rel.clone()) || self.matcher.is_excluded(&rel) {
				continue;
			}
			self.refresh_path(&mut next, &rel, &mut changes, now);
		}

		if !changes.is_empty() {
			self.snapshot = Arc::new(next);
		}
		changes
	}

	fn refresh_path(&self, next: &mut Snapshot, rel: &str, changes: &mut Vec<ChangeEvent>, now: Instant) {
		let present = fs::symlink_metadata(self.root.join(rel)).ok().and_then(|m| entry_from_metadata(rel, &m));

		match present {
			Some(entry) if entry.is_dir() => {
				let mut found = Vec::new();
				if let Err(e) = walk(&self.root, Some(rel), &self.matcher, &mut found) {
					warn!("Cannot walk {}: {}", rel, e);
				}
				let mut alive: BTreeSet<String> = found.iter().map(|e| e.path.clone()).collect();
				alive.insert(rel.to_string());

				record(next, entry, changes, now);
				for entry in found {
					record(next, entry, changes, now);
				}
				for path in next.paths_under(rel) {
					if !alive.contains(&path) {
						forget(next, &path, changes, now);
					}
				}
			}
			Some(entry) => {
				// A file replacing a directory takes its content with it
				for path in next.paths_under(rel) {
					if path != rel {
						forget(next, &path, changes, now);
					}
				}
				record(next, entry, changes, now);
			}
			None => {
				for path in next.paths_under(rel) {
					forget(next, &path, changes, now);
				}
			}
		}
	}

	/// Full rescan after the notification source lost events
	pub fn rescan(&mut self) -> Vec<ChangeEvent> {
		match scan_local(&self.root, &self.matcher) {
			Ok(fresh) => {
				let changes = self.snapshot.diff(&fresh, Duration::ZERO);
				if !changes.is_empty() {
					self.snapshot = Arc::new(fresh);
				}
				changes
			}
			Err(e) => {
				warn!("Rescan of {} failed: {}", self.root.display(), e);
				vec![]
			}
		}
	}

	/// Forward local changes until shutdown
	pub async fn run(mut self, tx: mpsc::Sender<Message>, mut shutdown: watch::Receiver<bool>) {
		loop {
			let event = tokio::select! {
				_ = shutdown.changed() => break,
				event = self.events.recv() => event,
			};
			let Some(event) = event else { break };

			let mut pending = vec![event];
			while let Ok(more) = self.events.try_recv() {
				pending.push(more);
			}

			let (paths, rescan) = collect_paths(pending);
			let changes = if rescan { self.rescan() } else { self.refresh(&paths) };
			if changes.is_empty() {
				continue;
			}

			trace!("Local: {} change(s)", changes.len());
			let message = Message::Changes { side: Side::Local, events: changes, snapshot: self.snapshot() };
			if tx.send(message).await.is_err() {
				break;
			}
		}
		debug!("Local watcher stopped");
	}
}

fn record(next: &mut Snapshot, entry: FileEntry, changes: &mut Vec<ChangeEvent>, now: Instant) {
	let kind = match next.get(&entry.path) {
		None => Some(ChangeKind::Created),
		Some(old) if !old.matches(&entry, Duration::ZERO) => Some(ChangeKind::Modified),
		Some(_) => None,
	};
	if let Some(kind) = kind {
		changes.push(ChangeEvent::at(&entry.path, Side::Local, kind, now));
		next.insert(entry);
	}
}

fn forget(next: &mut Snapshot, path: &str, changes: &mut Vec<ChangeEvent>, now: Instant) {
	if next.remove(path).is_some() {
		changes.push(ChangeEvent::at(path, Side::Local, ChangeKind::Deleted, now));
	}
}

/// Paths worth re-examining, plus whether a full rescan was requested
fn collect_paths(events: Vec<notify::Result<Event>>) -> (Vec<PathBuf>, bool) {
	let mut paths = Vec::new();
	let mut rescan = false;
	for event in events {
		match event {
			Ok(event) => {
				if event.need_rescan() {
					rescan = true;
				}
				if matches!(event.kind, EventKind::Access(_)) {
					continue;
				}
				paths.extend(event.paths);
			}
			Err(e) => {
				warn!("Watch error: {}", e);
				rescan = true;
			}
		}
	}
	(paths, rescan)
}

// vim: ts=4
