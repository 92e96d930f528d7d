//! Conflict resolution logic
//!
//! Resolution is fully automatic and keeps every variant: each surviving file
//! moves to a side-tagged marker name and is mirrored to the other side.
//! Resolutions never delete.

use super::markers::{free_marker, is_marker};
use super::{ConflictRecord, Resolution};
use crate::error::SyncError;
use crate::logging::*;
use crate::plan::{PlanBuilder, SyncAction};
use crate::types::{EntryKind, FileEntry, Side, Snapshots};

/// Turns conflict records into keep-both actions
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
	pub fn new() -> Self {
		ConflictResolver
	}

	/// Resolve `record`, queueing its actions on `plan`.
	///
	/// Marker names avoid every path present on either side and every
	/// destination already claimed by the plan.
	pub fn resolve(
		&self,
		mut record: ConflictRecord,
		snapshots: &Snapshots,
		plan: &mut PlanBuilder,
	) -> ConflictRecord {
		if is_marker(&record.path) {
			debug!("Conflict on marker file {}", record.path);
		}

		let taken = |candidate: &str| {
			snapshots.contains(candidate)
				|| plan.is_claimed(Side::Local, candidate)
				|| plan.is_claimed(Side::Remote, candidate)
		};

		let mut actions = Vec::new();
		let mut local_marker = None;
		let mut remote_marker = None;

		for side in [Side::Local, Side::Remote] {
			let entry = entry_for(&record, side);
			let other = entry_for(&record, side.other());
			match entry.map(|e| e.kind) {
				Some(EntryKind::File) => {
					let marker = free_marker(&record.path, side, &taken);
					actions.push(SyncAction::conflict_copy(&record.path, side, &marker));
					match side {
						Side::Local => local_marker = Some(marker),
						Side::Remote => remote_marker = Some(marker),
					}
				}
				Some(EntryKind::Dir) if other.map(|o| o.kind) != Some(EntryKind::Dir) => {
					// The other side's file (if any) is marked away first
					actions.push(SyncAction::mkdir(&record.path, side).as_conflict());
				}
				_ => {}
			}
		}

		for action in enforce_policy(&record.path, actions) {
			info!("Conflict ({}) on {}: {}", record.conflict_type, record.path, action);
			plan.push(action);
		}

		record.resolution = Resolution::KeepBoth { local_marker, remote_marker };
		record
	}
}

fn entry_for(record: &ConflictRecord, side: Side) -> Option<&FileEntry> {
	match side {
		Side::Local => record.local.as_ref(),
		Side::Remote => record.remote.as_ref(),
	}
}

/// Drop any delete from a conflict resolution. Deletion would lose one of the
/// variants; the remaining keep-both actions stand in for it.
pub fn enforce_policy(path: &str, actions: Vec<SyncAction>) -> Vec<SyncAction> {
	let (deletes, kept): (Vec<SyncAction>, Vec<SyncAction>) =
		actions.into_iter().partition(|a| a.is_delete());

	for action in deletes {
		let violation = SyncError::ConflictPolicy {
			path: path.to_string(),
			message: format!("resolution tried '{}', keeping both copies instead", action),
		};
		error!("{}", violation);
	}

	kept
}


// vim: ts=4
