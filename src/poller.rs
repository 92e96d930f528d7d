//! Remote poller: periodic full listings of the remote, diffed against the
//! previous listing with the modify-window tolerance
//!
//! Polls run strictly one after another. A failed poll keeps the previous
//! snapshot and the next tick tries again.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::error::SyncError;
use crate::exclusion::PatternMatcher;
use crate::logging::*;
use crate::mover::DataMover;
use crate::scheduler::Message;
use crate::types::{ChangeEvent, FileEntry, Side, Snapshot};

/// Build a snapshot from a raw listing.
///
/// Excluded paths and everything under them are dropped. Remotes that allow
/// duplicate names can list a path more than once; the newest entry is kept.
pub fn snapshot_from_listing(side: Side, entries: Vec<FileEntry>, matcher: &PatternMatcher) -> Snapshot {
	let mut newest: BTreeMap<String, FileEntry> = BTreeMap::new();
	for entry in entries {
		if matcher.is_excluded(&entry.path) {
			continue;
		}
		match newest.get(&entry.path) {
			Some(existing) if existing.mtime >= entry.mtime => {
				debug!("Duplicate listing of {}, keeping the newest", entry.path);
			}
			_ => {
				newest.insert(entry.path.clone(), entry);
			}
		}
	}
	Snapshot::from_entries(side, newest.into_values())
}

pub struct RemotePoller {
	mover: Arc<dyn DataMover>,
	matcher: PatternMatcher,
	window: Duration,
	interval: Duration,
	snapshot: Arc<Snapshot>,
}

impl RemotePoller {
	pub fn new(mover: Arc<dyn DataMover>, matcher: PatternMatcher, window: Duration, interval: Duration) -> Self {
		RemotePoller { mover, matcher, window, interval, snapshot: Arc::new(Snapshot::new(Side::Remote)) }
	}

	pub fn snapshot(&self) -> Arc<Snapshot> {
		self.snapshot.clone()
	}

	/// One listing of the remote root, filtered and deduplicated
	pub async fn list(&self) -> Result<Snapshot, SyncError> {
		let entries = self
			.mover
			.list(Side::Remote)
			.await
			.map_err(|e| SyncError::Transport { operation: "list".to_string(), message: e.to_string() })?;
		Ok(snapshot_from_listing(Side::Remote, entries, &self.matcher))
	}

	/// First listing; its failure is reported to the caller instead of retried
	pub async fn initial_listing(&mut self) -> Result<Arc<Snapshot>, SyncError> {
		let snapshot = self.list().await?;
		info!("Remote listing: {} entries", snapshot.len());
		self.snapshot = Arc::new(snapshot);
		Ok(self.snapshot.clone())
	}

	/// Poll once. Returns the changes since the previous listing, or `None`
	/// when the listing failed and the previous snapshot was kept.
	pub async fn poll(&mut self) -> Option<Vec<ChangeEvent>> {
		match self.list().await {
			Ok(fresh) => {
				let changes = self.snapshot.diff(&fresh, self.window);
				if !changes.is_empty() {
					debug!("Remote: {} change(s)", changes.len());
				}
				self.snapshot = Arc::new(fresh);
				Some(changes)
			}
			Err(e) => {
				warn!("Remote poll failed, keeping previous listing: {}", e);
				None
			}
		}
	}

	/// Poll on every interval tick and whenever woken, until shutdown.
	///
	/// A woken poll always reports, even when nothing changed, so the
	/// scheduler knows the remote snapshot is fresh.
	pub async fn run(
		mut self,
		tx: mpsc::Sender<Message>,
		wake: mpsc::Receiver<()>,
		mut shutdown: watch::Receiver<bool>,
	) {
		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// The first tick fires immediately; the initial listing already covered it
		ticker.tick().await;

		let mut wake = Some(wake);
		loop {
			let trigger = tokio::select! {
				_ = shutdown.changed() => break,
				_ = ticker.tick() => Some(false),
				woke = recv_wake(&mut wake) => woke.map(|_| true),
			};
			let woken = match trigger {
				Some(woken) => woken,
				None => {
					// Nobody can wake us any more; keep the regular ticks
					wake = None;
					continue;
				}
			};
			if woken {
				if let Some(rx) = wake.as_mut() {
					while rx.try_recv().is_ok() {}
				}
				ticker.reset();
			}

			let changes = self.poll().await.unwrap_or_default();
			if changes.is_empty() && !woken {
				continue;
			}
			let snapshot = self.snapshot();
			let message = if woken {
				Message::Refreshed { side: Side::Remote, events: changes, snapshot }
			} else {
				Message::Changes { side: Side::Remote, events: changes, snapshot }
			};
			if tx.send(message).await.is_err() {
				break;
			}
		}
		debug!("Remote poller stopped");
	}
}

async fn recv_wake(wake: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
	match wake {
		Some(rx) => rx.recv().await,
		None => std::future::pending().await,
	}
}


// vim: ts=4
