//! Plan execution through the data-mover
//!
//! Stages run one after another. Within a stage actions are dispatched
//! concurrently, at most `transfers` at a time, and all of them are awaited
//! before the next stage starts. A failing action is recorded and logged; it
//! blocks nothing and rolls nothing back.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::error::{MoverError, SyncError};
use crate::logging::*;
use crate::mover::{DataMover, Location};
use crate::plan::{SyncAction, SyncOperation, SyncPlan};
use crate::types::{EntryKind, Side};

/// Result of one action
#[derive(Debug)]
pub enum ActionOutcome {
	Done,
	Failed(SyncError),
}

impl ActionOutcome {
	pub fn is_done(&self) -> bool {
		matches!(self, ActionOutcome::Done)
	}
}

#[derive(Debug)]
pub struct ActionReport {
	pub action: SyncAction,
	pub outcome: ActionOutcome,
}

/// Per-action outcomes of one executed plan, in completion order
#[derive(Debug, Default)]
pub struct SyncReport {
	pub actions: Vec<ActionReport>,
}

impl SyncReport {
	pub fn succeeded(&self) -> usize {
		self.actions.iter().filter(|r| r.outcome.is_done()).count()
	}

	pub fn failed(&self) -> usize {
		self.actions.len() - self.succeeded()
	}

	pub fn failures(&self) -> impl Iterator<Item = &ActionReport> {
		self.actions.iter().filter(|r| !r.outcome.is_done())
	}

	pub fn outcome_for(&self, action: &SyncAction) -> Option<&ActionOutcome> {
		self.actions.iter().find(|r| &r.action == action).map(|r| &r.outcome)
	}
}

#[derive(Clone)]
pub struct SyncExecutor {
	mover: Arc<dyn DataMover>,
	transfers: usize,
}

impl SyncExecutor {
	pub fn new(mover: Arc<dyn DataMover>, transfers: usize) -> Self {
		SyncExecutor { mover, transfers: transfers.max(1) }
	}

	pub fn transfers(&self) -> usize {
		self.transfers
	}

	/// Drain the whole plan
	pub async fn execute(&self, plan: SyncPlan) -> SyncReport {
		let total = plan.len();
		let mut report = SyncReport::default();

		for stage in plan.into_stages() {
			let results: Vec<ActionReport> = stream::iter(stage)
				.map(|action| async move {
					let outcome = match self.apply(&action).await {
						Ok(()) => ActionOutcome::Done,
						Err(e) => ActionOutcome::Failed(e),
					};
					ActionReport { action, outcome }
				})
				.buffer_unordered(self.transfers)
				.collect()
				.await;
			report.actions.extend(results);
		}

		for failure in report.failures() {
			if let ActionOutcome::Failed(e) = &failure.outcome {
				warn!("Failed: {}: {}", failure.action, e);
			}
		}
		info!("Sync finished: {} of {} action(s) succeeded", report.succeeded(), total);

		report
	}

	/// Run one action against the data-mover
	pub async fn apply(&self, action: &SyncAction) -> Result<(), SyncError> {
		debug!("Running {}", action);
		let src = Location::new(action.source, &action.path);
		let dst = Location::new(action.destination, &action.target);

		let result = match action.operation {
			SyncOperation::Copy => self.mover.copy(&src, &dst).await,
			SyncOperation::Mkdir => self.mover.mkdir(&dst).await,
			SyncOperation::Delete => match action.kind {
				EntryKind::File => self.mover.delete(&dst).await,
				EntryKind::Dir => self.mover.rmdir(&dst).await,
			},
			SyncOperation::ConflictCopy => {
				// Mirror first so the variant exists on the other side before it moves
				let marked = Location::new(action.source, &action.target);
				match self.mover.copy(&src, &dst).await {
					Ok(()) => self.mover.move_to(&src, &marked).await,
					Err(e) => Err(e),
				}
			}
		};

		result.map_err(|e| classify_failure(action, e))
	}
}

/// Failures writing the remote are transport errors, the rest local I/O
/// unless the remote read side reported a network failure
fn classify_failure(action: &SyncAction, error: MoverError) -> SyncError {
	let transport = match action.destination {
		Side::Remote => !matches!(error, MoverError::SpawnFailed { .. }),
		Side::Local => action.source == Side::Remote && is_transport(&error),
	};
	if transport {
		SyncError::Transport { operation: action.operation.to_string(), message: error.to_string() }
	} else {
		SyncError::LocalIo { path: action.path.clone(), message: error.to_string() }
	}
}

/// rclone failures that look like the remote rather than the local disk
fn is_transport(error: &MoverError) -> bool {
	match error {
		MoverError::Failed { stderr, .. } => {
			let s = stderr.to_lowercase();
			["timeout", "connection", "network", "rate limit", "unauthorized", "503", "500"]
				.iter()
				.any(|needle| s.contains(needle))
		}
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn failed(stderr: &str) -> MoverError {
		MoverError::Failed { operation: "copyto".to_string(), status: Some(1), stderr: stderr.to_string() }
	}

	#[test]
	fn test_classify_failure() {
		let upload = SyncAction::copy("a.txt", Side::Local);
		assert!(matches!(classify_failure(&upload, failed("boom")), SyncError::Transport { .. }));

		let download = SyncAction::copy("a.txt", Side::Remote);
		assert!(matches!(classify_failure(&download, failed("permission denied")), SyncError::LocalIo { .. }));
		assert!(matches!(
			classify_failure(&download, failed("connection reset by peer")),
			SyncError::Transport { .. }
		));
	}
}

// vim: ts=4
