//! Reconciliation: classify every touched path and build the sync plan
//!
//! For each path of a closed batch (every known path on the startup batch):
//!
//! 1. both sides absent, both directories, or matching files: converged
//! 2. changed on exactly one side: propagate towards the other side
//! 3. changed on both sides with differing results: conflict
//!
//! A deletion on one side against a modification on the other lands in 3.
//! Reconciliation only reads snapshots.

use crate::batch::ChangeBatch;
use crate::conflict::{ConflictRecord, ConflictResolver, ConflictType};
use crate::logging::*;
use crate::plan::{PlanBuilder, SyncAction, SyncPlan};
use crate::types::{ChangeKind, EntryKind, FileEntry, Side, Snapshots};
use std::collections::BTreeSet;
use std::time::Duration;

/// Outcome of classifying a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
	/// Both sides agree, nothing to do
	Converged,
	/// Only this side changed; its state wins
	Propagate(Side),
	/// Both sides changed incompatibly
	Conflict,
}

/// Result of one reconciliation cycle
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
	pub plan: SyncPlan,
	pub conflicts: Vec<ConflictRecord>,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
	window: Duration,
	resolver: ConflictResolver,
}

impl Reconciler {
	/// `window` is the modify-window tolerance used to compare entries
	pub fn new(window: Duration) -> Self {
		Reconciler { window, resolver: ConflictResolver::new() }
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	/// Classify `path` for `batch` against the current snapshots
	pub fn classify(&self, path: &str, batch: &ChangeBatch, snapshots: &Snapshots) -> Classification {
		let local = snapshots.local.get(path);
		let remote = snapshots.remote.get(path);

		if self.converged(local, remote) {
			return Classification::Converged;
		}

		let (local_changed, remote_changed) = if batch.is_startup() {
			(local.is_some(), remote.is_some())
		} else {
			(batch.changed(path, Side::Local), batch.changed(path, Side::Remote))
		};

		match (local_changed, remote_changed) {
			(true, true) => Classification::Conflict,
			(true, false) => self.one_sided(Side::Local, local, remote),
			(false, true) => self.one_sided(Side::Remote, remote, local),
			(false, false) => {
				// Untouched by this batch; a later batch or restart picks it up
				Classification::Converged
			}
		}
	}

	fn converged(&self, local: Option<&FileEntry>, remote: Option<&FileEntry>) -> bool {
		match (local, remote) {
			(None, None) => true,
			(Some(l), Some(r)) => l.matches(r, self.window),
			_ => false,
		}
	}

	/// Propagation unless it would overwrite an entry of another kind
	fn one_sided(
		&self,
		from: Side,
		changed: Option<&FileEntry>,
		other: Option<&FileEntry>,
	) -> Classification {
		match (changed, other) {
			(Some(c), Some(o)) if c.kind != o.kind => Classification::Conflict,
			_ => Classification::Propagate(from),
		}
	}

	/// Build the plan for a closed batch
	pub fn reconcile(&self, batch: &ChangeBatch, snapshots: &Snapshots) -> Reconciliation {
		let paths: BTreeSet<String> = if batch.is_startup() {
			snapshots.local.paths().chain(snapshots.remote.paths()).map(String::from).collect()
		} else {
			batch.paths()
		};

		let mut builder = PlanBuilder::new();
		let mut conflicted = Vec::new();

		for path in &paths {
			match self.classify(path, batch, snapshots) {
				Classification::Converged => trace!("{} converged", path),
				Classification::Propagate(from) => {
					let action = propagate(path, from, snapshots);
					debug!("{}", action);
					builder.push(action);
				}
				Classification::Conflict => conflicted.push(path.as_str()),
			}
		}

		// Resolved after propagation so marker names avoid every claimed destination
		let mut conflicts = Vec::new();
		for path in conflicted {
			let local = snapshots.local.get(path).cloned();
			let remote = snapshots.remote.get(path).cloned();
			let mut record = ConflictRecord::new(path, local, remote);
			if both_created(path, batch) && record.conflict_type == ConflictType::ModifyModify {
				record = record.with_type(ConflictType::CreateCreate);
			}
			conflicts.push(self.resolver.resolve(record, snapshots, &mut builder));
		}

		let plan = builder.build();
		if plan.is_empty() {
			debug!("Reconciled {} path(s): nothing to do", paths.len());
		} else {
			info!(
				"Reconciled {} path(s): {} action(s), {} conflict(s)",
				paths.len(),
				plan.len(),
				conflicts.len()
			);
		}

		Reconciliation { plan, conflicts }
	}
}

/// Action carrying `from`'s current state of `path` to the other side
fn propagate(path: &str, from: Side, snapshots: &Snapshots) -> SyncAction {
	match snapshots.get(from).get(path) {
		Some(entry) if entry.is_dir() => SyncAction::mkdir(path, from),
		Some(_) => SyncAction::copy(path, from),
		None => {
			let target = from.other();
			let kind = snapshots.get(target).get(path).map(|e| e.kind).unwrap_or(EntryKind::File);
			SyncAction::delete(path, target, kind)
		}
	}
}

fn both_created(path: &str, batch: &ChangeBatch) -> bool {
	if batch.is_startup() {
		return true;
	}
	[Side::Local, Side::Remote]
		.iter()
		.all(|side| batch.event(path, *side).map(|e| e.kind) == Some(ChangeKind::Created))
}


// vim: ts=4
