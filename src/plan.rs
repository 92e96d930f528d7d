//! Sync actions and the ordered plan produced by one reconciliation cycle

use crate::logging::*;
use crate::types::{EntryKind, Side};
use crate::util::depth;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncOperation {
	/// Preserve one conflicting variant under a marker name on both sides
	ConflictCopy,
	/// Create a directory on the destination side
	Mkdir,
	/// Copy a file from source to destination, same path
	Copy,
	/// Remove the path from the destination side
	Delete,
}

impl SyncOperation {
	/// Execution phase: conflict copies, then creations, then deletions
	fn phase(self) -> u8 {
		match self {
			SyncOperation::ConflictCopy => 0,
			SyncOperation::Mkdir | SyncOperation::Copy => 1,
			SyncOperation::Delete => 2,
		}
	}
}

impl fmt::Display for SyncOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SyncOperation::ConflictCopy => "conflict-copy",
			SyncOperation::Mkdir => "mkdir",
			SyncOperation::Copy => "copy",
			SyncOperation::Delete => "delete",
		};
		f.write_str(name)
	}
}

/// One transfer operation handed to the data-mover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
	pub operation: SyncOperation,
	/// Side whose state is being propagated
	pub source: Side,
	/// Side that is written to
	pub destination: Side,
	/// Path read on the source side
	pub path: String,
	/// Path written on the destination side; differs from `path` only for conflict copies
	pub target: String,
	pub kind: EntryKind,
	/// Produced by conflict resolution
	pub conflict: bool,
}

impl SyncAction {
	pub fn copy(path: impl Into<String>, from: Side) -> Self {
		let path = path.into();
		SyncAction {
			operation: SyncOperation::Copy,
			source: from,
			destination: from.other(),
			target: path.clone(),
			path,
			kind: EntryKind::File,
			conflict: false,
		}
	}

	pub fn mkdir(path: impl Into<String>, from: Side) -> Self {
		let path = path.into();
		SyncAction {
			operation: SyncOperation::Mkdir,
			source: from,
			destination: from.other(),
			target: path.clone(),
			path,
			kind: EntryKind::Dir,
			conflict: false,
		}
	}

	/// Delete `path` on `on`, propagating a deletion observed on the other side
	pub fn delete(path: impl Into<String>, on: Side, kind: EntryKind) -> Self {
		let path = path.into();
		SyncAction {
			operation: SyncOperation::Delete,
			source: on.other(),
			destination: on,
			target: path.clone(),
			path,
			kind,
			conflict: false,
		}
	}

	/// Move `path` on `from` to `marker` and mirror it to the other side as `marker`
	pub fn conflict_copy(path: impl Into<String>, from: Side, marker: impl Into<String>) -> Self {
		SyncAction {
			operation: SyncOperation::ConflictCopy,
			source: from,
			destination: from.other(),
			path: path.into(),
			target: marker.into(),
			kind: EntryKind::File,
			conflict: true,
		}
	}

	pub fn as_conflict(mut self) -> Self {
		self.conflict = true;
		self
	}

	pub fn is_delete(&self) -> bool {
		self.operation == SyncOperation::Delete
	}

	/// Every (side, path) this action writes to
	pub fn writes(&self) -> Vec<(Side, &str)> {
		match self.operation {
			SyncOperation::ConflictCopy => {
				vec![(self.destination, self.target.as_str()), (self.source, self.target.as_str())]
			}
			_ => vec![(self.destination, self.target.as_str())],
		}
	}

	/// Stage key: actions sharing a key have no ordering dependency.
	/// Creations run parents first, deletions children first.
	fn stage_key(&self) -> (u8, i64) {
		let depth = depth(&self.target) as i64;
		match self.operation {
			SyncOperation::Delete => (self.operation.phase(), -depth),
			_ => (self.operation.phase(), depth),
		}
	}
}

impl fmt::Display for SyncAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.operation {
			SyncOperation::ConflictCopy => write!(
				f,
				"conflict-copy {} {} -> {} (both sides)",
				self.source, self.path, self.target
			),
			SyncOperation::Delete => write!(f, "delete {} on {}", self.path, self.destination),
			op => write!(f, "{} {} {} -> {}", op, self.path, self.source, self.destination),
		}
	}
}

/// Ordered actions of one cycle; computed fresh and discarded after execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
	actions: Vec<SyncAction>,
}

impl SyncPlan {
	/// Order actions into their execution sequence
	pub fn new(mut actions: Vec<SyncAction>) -> Self {
		actions.sort_by(|a, b| {
			a.stage_key()
				.cmp(&b.stage_key())
				.then_with(|| a.target.cmp(&b.target))
				.then_with(|| a.source.cmp(&b.source))
		});
		SyncPlan { actions }
	}

	pub fn actions(&self) -> &[SyncAction] {
		&self.actions
	}

	pub fn iter(&self) -> impl Iterator<Item = &SyncAction> {
		self.actions.iter()
	}

	pub fn len(&self) -> usize {
		self.actions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.actions.is_empty()
	}

	pub fn delete_count(&self) -> usize {
		self.actions.iter().filter(|a| a.is_delete()).count()
	}

	/// Actions for one path, in plan order
	pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a SyncAction> + 'a {
		self.actions.iter().filter(move |a| a.path == path)
	}

	/// Split into stages that must run one after another
	pub fn into_stages(self) -> Vec<Vec<SyncAction>> {
		let mut stages: Vec<Vec<SyncAction>> = Vec::new();
		let mut current_key = None;
		for action in self.actions {
			let key = action.stage_key();
			if current_key != Some(key) {
				stages.push(Vec::new());
				current_key = Some(key);
			}
			if let Some(stage) = stages.last_mut() {
				stage.push(action);
			}
		}
		stages
	}
}

/// Collects actions while keeping one writer per destination path
#[derive(Debug, Default)]
pub struct PlanBuilder {
	actions: Vec<SyncAction>,
	claimed: BTreeSet<(Side, String)>,
}

impl PlanBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether some queued action already writes `path` on `side`
	pub fn is_claimed(&self, side: Side, path: &str) -> bool {
		self.claimed.contains(&(side, path.to_string()))
	}

	/// Queue an action; refused when another action already writes one of its destinations
	pub fn push(&mut self, action: SyncAction) -> bool {
		if let Some((side, path)) = action.writes().into_iter().find(|(s, p)| self.is_claimed(*s, p)) {
			warn!("Dropping '{}': {} {} is already written by this plan", action, side, path);
			return false;
		}
		for (side, path) in action.writes() {
			self.claimed.insert((side, path.to_string()));
		}
		self.actions.push(action);
		true
	}

	pub fn len(&self) -> usize {
		self.actions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.actions.is_empty()
	}

	pub fn build(self) -> SyncPlan {
		SyncPlan::new(self.actions)
	}
}


// vim: ts=4
