//! Scheduler: the single coordinating loop
//!
//! Owns both snapshots, the aggregator and its cooldown timer, and is the
//! only place a reconciliation cycle starts. Watcher and poller feed it
//! typed messages; at most one plan executes at a time.
//!
//! ```text
//! Startup -> Idle -> Batching -> Reconciling -> Syncing -> Idle ...
//!                                                      \-> Stopped
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::batch::{Aggregator, ChangeBatch};
use crate::config::Config;
use crate::error::{ConfigError, SyncError};
use crate::exclusion::PatternMatcher;
use crate::executor::{SyncExecutor, SyncReport};
use crate::logging::*;
use crate::mover::{DataMover, RcloneMover};
use crate::plan::SyncPlan;
use crate::poller::RemotePoller;
use crate::reconcile::Reconciler;
use crate::types::{ChangeEvent, ChangeKind, Side, Snapshot, Snapshots};
use crate::utils::spawn_shutdown_listener;
use crate::watcher::LocalWatcher;

/// Inbound queue capacity of the coordinating loop
const INBOX_CAPACITY: usize = 256;

/// Typed messages from the watcher and the poller
#[derive(Debug)]
pub enum Message {
	/// Changes observed on one side, with that side's snapshot after them
	Changes { side: Side, events: Vec<ChangeEvent>, snapshot: Arc<Snapshot> },

	/// Reply to an explicit refresh request; sent even when nothing changed
	Refreshed { side: Side, events: Vec<ChangeEvent>, snapshot: Arc<Snapshot> },
}

enum Wakeup {
	Shutdown,
	Inbox(Option<Message>),
	Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
	Startup,
	Idle,
	Batching,
	Reconciling,
	Syncing,
	Stopped,
}

impl fmt::Display for SchedulerState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// What a finished run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
	/// Reconciliation cycles, the startup cycle included
	pub cycles: usize,
	/// Plans handed to the executor
	pub syncs: usize,
	pub failed_actions: usize,
}

pub struct Scheduler {
	state: SchedulerState,
	snapshots: Snapshots,
	aggregator: Aggregator,
	reconciler: Reconciler,
	executor: SyncExecutor,
	mover: Arc<dyn DataMover>,
	inbox: mpsc::Receiver<Message>,
	inbox_open: bool,
	poll_now: Option<mpsc::Sender<()>>,
	awaiting_poll: bool,
	/// Changes whose propagation failed; they count as changed until a
	/// later cycle carries them through or finds the path converged
	unsynced: BTreeMap<(String, Side), ChangeEvent>,
	shutdown: watch::Receiver<bool>,
	stopping: bool,
	dedupe: bool,
	dry_run: bool,
	summary: RunSummary,
}

impl Scheduler {
	pub fn new(
		config: &Config,
		mover: Arc<dyn DataMover>,
		snapshots: Snapshots,
		inbox: mpsc::Receiver<Message>,
		shutdown: watch::Receiver<bool>,
	) -> Self {
		Scheduler {
			state: SchedulerState::Startup,
			snapshots,
			aggregator: Aggregator::new(config.batch_cooldown),
			reconciler: Reconciler::new(config.modify_window.duration()),
			executor: SyncExecutor::new(mover.clone(), config.transfers),
			mover,
			inbox,
			inbox_open: true,
			poll_now: None,
			awaiting_poll: false,
			unsynced: BTreeMap::new(),
			shutdown,
			stopping: false,
			dedupe: config.dedupe,
			dry_run: config.dry_run,
			summary: RunSummary::default(),
		}
	}

	/// Ask the poller for an immediate listing after every sync, and keep the
	/// next batch closed until it arrives. Batches carrying local changes
	/// also wait for a fresh listing before they are reconciled.
	pub fn with_poll_trigger(mut self, poll_now: mpsc::Sender<()>) -> Self {
		self.poll_now = Some(poll_now);
		self
	}

	pub fn state(&self) -> SchedulerState {
		self.state
	}

	pub fn snapshots(&self) -> &Snapshots {
		&self.snapshots
	}

	fn set_state(&mut self, state: SchedulerState) {
		if self.state != state {
			trace!("{} -> {}", self.state, state);
			self.state = state;
		}
	}

	/// Run the startup cycle, then serve batches until shutdown
	pub async fn run(mut self) -> RunSummary {
		info!(
			"Startup: {} local and {} remote entries",
			self.snapshots.local.len(),
			self.snapshots.remote.len()
		);
		self.set_state(SchedulerState::Startup);
		self.cycle(ChangeBatch::startup()).await;

		while !self.stopping && !*self.shutdown.borrow() {
			let state = if self.aggregator.is_open() { SchedulerState::Batching } else { SchedulerState::Idle };
			self.set_state(state);

			let deadline = self.aggregator.deadline();
			let wakeup = tokio::select! {
				_ = self.shutdown.changed() => Wakeup::Shutdown,
				message = self.inbox.recv(), if self.inbox_open => Wakeup::Inbox(message),
				_ = sleep_until(deadline) => Wakeup::Cooldown,
			};

			match wakeup {
				Wakeup::Shutdown => self.stopping = true,
				Wakeup::Inbox(Some(message)) => self.accept(message),
				Wakeup::Inbox(None) => {
					warn!("Change sources stopped");
					self.inbox_open = false;
					self.stopping = true;
				}
				Wakeup::Cooldown => {
					if let Some(batch) = self.aggregator.take_expired(Instant::now()) {
						self.cycle(batch).await;
					}
				}
			}
		}

		if let Some(batch) = self.aggregator.discard() {
			info!("Stopping with {} unreconciled change(s); the next start picks them up", batch.len());
		}
		self.set_state(SchedulerState::Stopped);
		info!("Stopped after {} cycle(s)", self.summary.cycles);
		self.summary
	}

	/// Store the new snapshot and queue its events
	fn accept(&mut self, message: Message) {
		let (side, events, snapshot, refreshed) = match message {
			Message::Changes { side, events, snapshot } => (side, events, snapshot, false),
			Message::Refreshed { side, events, snapshot } => (side, events, snapshot, true),
		};
		if snapshot.side() != side {
			error!("Dropping {} snapshot delivered as {}", snapshot.side(), side);
			return;
		}
		self.snapshots.replace(snapshot);

		let now = Instant::now();
		if !events.is_empty() {
			debug!("{} {} change(s) queued", events.len(), side);
			self.aggregator.push_all(events, now);
		}

		if refreshed && self.awaiting_poll && self.state != SchedulerState::Syncing {
			debug!("Remote refreshed after sync");
			self.awaiting_poll = false;
			self.aggregator.release(now);
		}
	}

	/// One reconciliation cycle: reconcile, then execute the plan
	async fn cycle(&mut self, mut batch: ChangeBatch) {
		self.summary.cycles += 1;

		if self.dedupe {
			self.dedupe_remote().await;
		}

		self.set_state(SchedulerState::Reconciling);
		for (key, event) in std::mem::take(&mut self.unsynced) {
			if !batch.changed(&key.0, key.1) {
				debug!("Retrying {}", event);
				batch.merge(event);
			}
		}

		if batch.events().any(|e| e.side == Side::Local) && !self.refresh_remote(&mut batch).await {
			info!("Stopping before reconciling {} change(s); the next start picks them up", batch.len());
			return;
		}

		let outcome = self.reconciler.reconcile(&batch, &self.snapshots);
		if outcome.plan.is_empty() {
			return;
		}

		if self.dry_run {
			for action in outcome.plan.iter() {
				info!("[dry-run] {}", action);
			}
			return;
		}

		self.set_state(SchedulerState::Syncing);
		let report = self.sync(outcome.plan).await;
		self.summary.syncs += 1;
		self.summary.failed_actions += report.failed();
		self.remember_failures(&batch, &report);

		if self.dedupe {
			self.dedupe_remote().await;
		}

		// Batches stay closed until the remote listing reflects this sync
		let poll_requested = match &self.poll_now {
			Some(poll_now) => !matches!(poll_now.try_send(()), Err(TrySendError::Closed(_))),
			None => false,
		};
		if poll_requested {
			self.awaiting_poll = true;
		} else {
			self.aggregator.release(Instant::now());
		}
	}

	async fn dedupe_remote(&self) {
		if let Err(e) = self.mover.dedupe(Side::Remote).await {
			warn!("Remote dedupe failed: {}", e);
		}
	}

	/// Keep the change behind every failed action, so the next cycle still
	/// sees its side as changed
	fn remember_failures(&mut self, batch: &ChangeBatch, report: &SyncReport) {
		for failure in report.failures() {
			let (path, side) = (&failure.action.path, failure.action.source);
			let event = batch
				.event(path, side)
				.cloned()
				.unwrap_or_else(|| ChangeEvent::new(path.as_str(), side, ChangeKind::Modified));
			self.unsynced.insert((path.clone(), side), event);
		}
		if !self.unsynced.is_empty() {
			info!("{} change(s) left for the next cycle", self.unsynced.len());
		}
	}

	/// Ask the poller for a listing and wait for it, merging the remote
	/// changes it finds into `batch`. Returns `false` when stopping first.
	///
	/// A local change is only propagated against a remote listing taken
	/// after it was observed, so a remote edit the regular poll has not seen
	/// yet still ends up as a conflict.
	async fn refresh_remote(&mut self, batch: &mut ChangeBatch) -> bool {
		let poll_now = match &self.poll_now {
			Some(poll_now) => poll_now.clone(),
			None => return true,
		};
		if poll_now.send(()).await.is_err() {
			debug!("Remote poller gone, reconciling against the last listing");
			return true;
		}

		loop {
			let wakeup = tokio::select! {
				_ = self.shutdown.changed(), if !self.stopping => Wakeup::Shutdown,
				message = self.inbox.recv(), if self.inbox_open => Wakeup::Inbox(message),
				else => Wakeup::Inbox(None),
			};

			match wakeup {
				Wakeup::Shutdown => {
					self.stopping = true;
					return false;
				}
				Wakeup::Inbox(Some(Message::Refreshed { side: Side::Remote, events, snapshot })) => {
					if snapshot.side() != Side::Remote {
						error!("Dropping {} snapshot delivered as remote", snapshot.side());
						continue;
					}
					debug!("Remote refreshed before reconciling: {} change(s)", events.len());
					self.snapshots.replace(snapshot);
					for event in events {
						batch.merge(event);
					}
					return true;
				}
				Wakeup::Inbox(Some(message)) => self.accept(message),
				Wakeup::Inbox(None) => {
					self.inbox_open = false;
					self.stopping = true;
					return false;
				}
				Wakeup::Cooldown => {}
			}
		}
	}

	/// Drain the plan while still taking in messages. New events pile up in
	/// the held aggregator; a shutdown request waits for the plan to finish.
	async fn sync(&mut self, plan: SyncPlan) -> SyncReport {
		self.aggregator.hold();

		let executor = self.executor.clone();
		let sync = executor.execute(plan);
		tokio::pin!(sync);

		loop {
			let wakeup = tokio::select! {
				report = &mut sync => return report,
				_ = self.shutdown.changed(), if !self.stopping => Wakeup::Shutdown,
				message = self.inbox.recv(), if self.inbox_open => Wakeup::Inbox(message),
			};

			match wakeup {
				Wakeup::Shutdown => {
					info!("Shutdown requested, letting the current sync finish");
					self.stopping = true;
				}
				Wakeup::Inbox(Some(message)) => self.accept(message),
				Wakeup::Inbox(None) => self.inbox_open = false,
				Wakeup::Cooldown => {}
			}
		}
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}

/// Validate the configuration, take both initial snapshots, then run until
/// shutdown. Errors are startup failures; once the loop runs, nothing but a
/// signal stops it.
pub async fn run(mut config: Config) -> Result<RunSummary, SyncError> {
	config.validate()?;
	let matcher = PatternMatcher::new(&config.exclude_patterns)?;
	let mover: Arc<dyn DataMover> = Arc::new(RcloneMover::from_config(&config));

	match mover.version().await {
		Ok(version) => info!("Using {}", version),
		Err(e) => {
			return Err(ConfigError::MissingTool { tool: config.rclone.clone(), message: e.to_string() }.into())
		}
	}

	let mut watcher = LocalWatcher::subscribe(&config.local_path, matcher.clone())?;
	let local = watcher.initial_scan().await?;

	let mut poller = RemotePoller::new(
		mover.clone(),
		matcher,
		config.modify_window.duration(),
		config.poll_interval,
	);
	let remote = poller.initial_listing().await.map_err(|e| ConfigError::RemoteUnreachable {
		remote: config.remote_path.clone(),
		message: e.to_string(),
	})?;

	info!(
		"Syncing {} <-> {} (poll {:?}, cooldown {:?}, modify-window {})",
		config.local_path.display(),
		config.remote_path,
		config.poll_interval,
		config.batch_cooldown,
		config.modify_window.as_str()
	);

	let (stop_tx, stop_rx) = watch::channel(false);
	spawn_shutdown_listener(stop_tx);

	let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
	let (wake_tx, wake_rx) = mpsc::channel(1);
	tokio::spawn(watcher.run(tx.clone(), stop_rx.clone()));
	tokio::spawn(poller.run(tx, wake_rx, stop_rx.clone()));

	let scheduler = Scheduler::new(&config, mover, Snapshots::new(local, remote), rx, stop_rx)
		.with_poll_trigger(wake_tx);
	Ok(scheduler.run().await)
}

// vim: ts=4
