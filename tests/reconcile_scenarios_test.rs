/// Reconciliation scenarios run end to end against the in-memory data-mover
///
/// Tests verify:
/// 1. Startup cross-copy of one-sided files
/// 2. Two-sided edits become keep-both conflict copies, never deletes
/// 3. Delete against modify is a conflict, not a silent deletion
/// 4. Plans are idempotent: the post-sync snapshots reconcile to nothing
/// 5. The modify-window boundary is inclusive
mod common;

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use common::memory::{ts, MemoryMover};
use tidesync::batch::ChangeBatch;
use tidesync::executor::SyncExecutor;
use tidesync::plan::{SyncAction, SyncOperation};
use tidesync::reconcile::Reconciler;
use tidesync::types::{ChangeEvent, ChangeKind, EntryKind, FileEntry, Side, Snapshot, Snapshots};

const WINDOW: Duration = Duration::from_secs(1);

fn event(path: &str, side: Side, kind: ChangeKind) -> ChangeEvent {
	ChangeEvent::new(path, side, kind)
}

fn snapshots(local: Vec<FileEntry>, remote: Vec<FileEntry>) -> Snapshots {
	Snapshots::new(
		std::sync::Arc::new(Snapshot::from_entries(Side::Local, local)),
		std::sync::Arc::new(Snapshot::from_entries(Side::Remote, remote)),
	)
}

#[test]
fn test_startup_local_only_file_is_uploaded() {
	let mover = MemoryMover::new();
	mover.put_file(Side::Local, "a.txt", 5, ts(0));

	let outcome = Reconciler::new(WINDOW).reconcile(&ChangeBatch::startup(), &mover.snapshots());

	assert_eq!(outcome.plan.actions(), &[SyncAction::copy("a.txt", Side::Local)]);
	let action = &outcome.plan.actions()[0];
	assert_eq!(action.source, Side::Local);
	assert_eq!(action.destination, Side::Remote);
	assert!(outcome.conflicts.is_empty());
}

#[test]
fn test_startup_cross_copies_both_ways() {
	let mover = MemoryMover::new();
	mover.put_file(Side::Local, "mine.txt", 1, ts(0));
	mover.put_file(Side::Remote, "theirs/deep/file.txt", 2, ts(0));
	mover.put_file(Side::Local, "shared.txt", 3, ts(10));
	mover.put_file(Side::Remote, "shared.txt", 3, ts(10));

	let plan = Reconciler::new(WINDOW).reconcile(&ChangeBatch::startup(), &mover.snapshots()).plan;

	let summary: Vec<(SyncOperation, Side, &str)> =
		plan.iter().map(|a| (a.operation, a.destination, a.path.as_str())).collect();
	assert_eq!(
		summary,
		vec![
			(SyncOperation::Copy, Side::Remote, "mine.txt"),
			(SyncOperation::Mkdir, Side::Local, "theirs"),
			(SyncOperation::Mkdir, Side::Local, "theirs/deep"),
			(SyncOperation::Copy, Side::Local, "theirs/deep/file.txt"),
		]
	);
}

#[tokio::test]
async fn test_notes_conflict_keeps_both_versions() {
	let mover = MemoryMover::new();
	mover.put_file(Side::Local, "notes.txt", 120, ts(100));
	mover.put_file(Side::Remote, "notes.txt", 80, ts(90));
	let batch = ChangeBatch::from_events(vec![
		event("notes.txt", Side::Local, ChangeKind::Modified),
		event("notes.txt", Side::Remote, ChangeKind::Modified),
	]);

	let reconciler = Reconciler::new(WINDOW);
	let outcome = reconciler.reconcile(&batch, &mover.snapshots());

	assert_eq!(outcome.plan.delete_count(), 0);
	assert_eq!(outcome.plan.len(), 2);
	let mut targets: Vec<&str> = outcome.plan.iter().map(|a| a.target.as_str()).collect();
	targets.sort();
	assert_eq!(targets, vec!["notes.local-conflict.txt", "notes.remote-conflict.txt"]);
	assert!(outcome.plan.iter().all(|a| a.operation == SyncOperation::ConflictCopy && a.conflict));
	assert!(!outcome.plan.iter().any(|a| a.is_delete() && a.path == "notes.txt"));

	let report = SyncExecutor::new(mover.clone(), 4).execute(outcome.plan).await;
	assert_eq!(report.failed(), 0);

	for side in [Side::Local, Side::Remote] {
		assert_eq!(mover.get(side, "notes.local-conflict.txt").map(|e| e.size), Some(120));
		assert_eq!(mover.get(side, "notes.remote-conflict.txt").map(|e| e.size), Some(80));
		assert!(!mover.contains(side, "notes.txt"));
	}

	// Same batch against the post-sync state: nothing left to do
	assert!(reconciler.reconcile(&batch, &mover.snapshots()).plan.is_empty());
}

#[tokio::test]
async fn test_old_txt_delete_versus_modify_is_conflict() {
	let mover = MemoryMover::new();
	mover.put_file(Side::Remote, "old.txt", 42, ts(500));
	let batch = ChangeBatch::from_events(vec![
		event("old.txt", Side::Local, ChangeKind::Deleted),
		event("old.txt", Side::Remote, ChangeKind::Modified),
	]);

	let reconciler = Reconciler::new(WINDOW);
	let outcome = reconciler.reconcile(&batch, &mover.snapshots());

	assert_eq!(outcome.conflicts.len(), 1);
	assert_eq!(outcome.plan.delete_count(), 0);
	assert_eq!(
		outcome.plan.actions(),
		&[SyncAction::conflict_copy("old.txt", Side::Remote, "old.remote-conflict.txt")]
	);

	SyncExecutor::new(mover.clone(), 2).execute(outcome.plan).await;
	assert_eq!(mover.get(Side::Local, "old.remote-conflict.txt").map(|e| e.size), Some(42));
	assert_eq!(mover.get(Side::Remote, "old.remote-conflict.txt").map(|e| e.size), Some(42));
	assert!(reconciler.reconcile(&batch, &mover.snapshots()).plan.is_empty());
}

#[tokio::test]
async fn test_one_sided_changes_propagate_once_and_converge() {
	let mover = MemoryMover::new();
	mover.put_file(Side::Local, "edited.txt", 10, ts(50));
	mover.put_file(Side::Remote, "edited.txt", 7, ts(0));
	mover.put_file(Side::Remote, "removed.txt", 3, ts(0));
	mover.put_file(Side::Remote, "fresh/new.md", 9, ts(60));
	mover.put_dir(Side::Local, "empty");

	let batch = ChangeBatch::from_events(vec![
		event("edited.txt", Side::Local, ChangeKind::Modified),
		event("removed.txt", Side::Local, ChangeKind::Deleted),
		event("fresh", Side::Remote, ChangeKind::Created),
		event("fresh/new.md", Side::Remote, ChangeKind::Created),
		event("empty", Side::Local, ChangeKind::Created),
	]);

	let reconciler = Reconciler::new(WINDOW);
	let plan = reconciler.reconcile(&batch, &mover.snapshots()).plan;

	assert_eq!(plan.len(), 5);
	for path in batch.paths() {
		assert_eq!(plan.for_path(&path).count(), 1, "exactly one action for {}", path);
	}
	assert_eq!(plan.for_path("edited.txt").next().map(|a| a.destination), Some(Side::Remote));
	assert_eq!(
		plan.for_path("removed.txt").next(),
		Some(&SyncAction::delete("removed.txt", Side::Remote, EntryKind::File))
	);
	assert_eq!(plan.for_path("fresh/new.md").next().map(|a| a.destination), Some(Side::Local));

	let report = SyncExecutor::new(mover.clone(), 4).execute(plan).await;
	assert_eq!(report.failed(), 0);

	// Idempotence: same batch, post-sync snapshots
	let again = reconciler.reconcile(&batch, &mover.snapshots());
	assert!(again.plan.is_empty());
	assert!(reconciler.reconcile(&batch, &mover.snapshots()).plan.is_empty());
	assert_eq!(mover.paths(Side::Local), mover.paths(Side::Remote));
}

#[test]
fn test_modify_window_boundary() {
	let reconciler = Reconciler::new(WINDOW);
	let batch = ChangeBatch::from_events(vec![
		event("f.bin", Side::Local, ChangeKind::Modified),
		event("f.bin", Side::Remote, ChangeKind::Modified),
	]);

	let at_window = snapshots(
		vec![FileEntry::file("f.bin", Side::Local, 64, ts(0))],
		vec![FileEntry::file("f.bin", Side::Remote, 64, ts(1))],
	);
	assert!(reconciler.reconcile(&batch, &at_window).plan.is_empty());

	let past_window = snapshots(
		vec![FileEntry::file("f.bin", Side::Local, 64, ts(0))],
		vec![FileEntry::file("f.bin", Side::Remote, 64, ts(1) + ChronoDuration::nanoseconds(1))],
	);
	let outcome = reconciler.reconcile(&batch, &past_window);
	assert_eq!(outcome.conflicts.len(), 1);
	assert_eq!(outcome.plan.len(), 2);
	assert_eq!(outcome.plan.delete_count(), 0);
}

#[test]
fn test_both_sides_changed_to_same_state_is_converged() {
	let mover = MemoryMover::new();
	mover.put_file(Side::Local, "same.txt", 5, ts(10));
	mover.put_file(Side::Remote, "same.txt", 5, ts(10));
	let batch = ChangeBatch::from_events(vec![
		event("same.txt", Side::Local, ChangeKind::Created),
		event("same.txt", Side::Remote, ChangeKind::Created),
	]);

	assert!(Reconciler::new(WINDOW).reconcile(&batch, &mover.snapshots()).plan.is_empty());
}

#[tokio::test]
async fn test_repeated_conflict_uses_next_marker() {
	let mover = MemoryMover::new();
	mover.put_file(Side::Local, "notes.txt", 1, ts(0));
	mover.put_file(Side::Remote, "notes.txt", 2, ts(100));
	mover.put_file(Side::Local, "notes.local-conflict.txt", 9, ts(0));
	mover.put_file(Side::Remote, "notes.local-conflict.txt", 9, ts(0));

	let batch = ChangeBatch::from_events(vec![
		event("notes.txt", Side::Local, ChangeKind::Modified),
		event("notes.txt", Side::Remote, ChangeKind::Modified),
	]);
	let plan = Reconciler::new(WINDOW).reconcile(&batch, &mover.snapshots()).plan;

	let targets: Vec<&str> = plan.iter().map(|a| a.target.as_str()).collect();
	assert!(targets.contains(&"notes.local-conflict-1.txt"));
	assert!(targets.contains(&"notes.remote-conflict.txt"));

	SyncExecutor::new(mover.clone(), 4).execute(plan).await;
	assert_eq!(mover.get(Side::Remote, "notes.local-conflict.txt").map(|e| e.size), Some(9));
}

// vim: ts=4
