//! Change batching: coalesces bursts of raw change events into one batch
//!
//! The aggregator keeps at most one open batch. Every event pushed while the
//! batch is open re-arms the cooldown deadline (sliding window). The batch
//! closes once the deadline passes without a new event.

use crate::logging::*;
use crate::types::{ChangeEvent, Side};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::time::Instant;

/// Touched paths of one cycle, at most one event per (path, side)
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
	events: BTreeMap<(String, Side), ChangeEvent>,
	startup: bool,
}

impl ChangeBatch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Implicit batch covering every path present on either side
	pub fn startup() -> Self {
		ChangeBatch { events: BTreeMap::new(), startup: true }
	}

	pub fn from_events(events: impl IntoIterator<Item = ChangeEvent>) -> Self {
		let mut batch = ChangeBatch::new();
		for event in events {
			batch.merge(event);
		}
		batch
	}

	/// Merge one event, the latest event for a (path, side) key wins
	pub fn merge(&mut self, event: ChangeEvent) {
		self.events.insert((event.path.clone(), event.side), event);
	}

	pub fn is_startup(&self) -> bool {
		self.startup
	}

	/// Whether `path` changed on `side` in this batch
	pub fn changed(&self, path: &str, side: Side) -> bool {
		self.events.contains_key(&(path.to_string(), side))
	}

	pub fn event(&self, path: &str, side: Side) -> Option<&ChangeEvent> {
		self.events.get(&(path.to_string(), side))
	}

	/// Distinct paths touched on either side, sorted
	pub fn paths(&self) -> BTreeSet<String> {
		self.events.keys().map(|(path, _)| path.clone()).collect()
	}

	pub fn events(&self) -> impl Iterator<Item = &ChangeEvent> {
		self.events.values()
	}

	pub fn len(&self) -> usize {
		self.events.len()
	}

	pub fn is_empty(&self) -> bool {
		self.events.is_empty() && !self.startup
	}
}

/// Owns the open batch and its cooldown deadline
#[derive(Debug)]
pub struct Aggregator {
	cooldown: Duration,
	batch: Option<ChangeBatch>,
	deadline: Option<Instant>,
	held: bool,
}

impl Aggregator {
	pub fn new(cooldown: Duration) -> Self {
		Aggregator { cooldown, batch: None, deadline: None, held: false }
	}

	pub fn cooldown(&self) -> Duration {
		self.cooldown
	}

	/// Add an event at `now`, opening a batch if none is open
	pub fn push(&mut self, event: ChangeEvent, now: Instant) {
		let batch = self.batch.get_or_insert_with(|| {
			trace!("Opening change batch");
			ChangeBatch::new()
		});
		batch.merge(event);
		if !self.held {
			self.deadline = Some(now + self.cooldown);
		}
	}

	pub fn push_all(&mut self, events: impl IntoIterator<Item = ChangeEvent>, now: Instant) {
		for event in events {
			self.push(event, now);
		}
	}

	/// Stop the cooldown timer; events keep accumulating
	pub fn hold(&mut self) {
		self.held = true;
		self.cancel();
	}

	/// Restart the cooldown from `now` if a batch accumulated while held
	pub fn release(&mut self, now: Instant) {
		self.held = false;
		if self.batch.is_some() {
			self.deadline = Some(now + self.cooldown);
		}
	}

	/// Cancel the pending cooldown timer. Safe to call at any time.
	pub fn cancel(&mut self) {
		self.deadline = None;
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	pub fn is_open(&self) -> bool {
		self.batch.is_some()
	}

	pub fn is_held(&self) -> bool {
		self.held
	}

	/// Close and return the batch when its cooldown has elapsed at `now`
	pub fn take_expired(&mut self, now: Instant) -> Option<ChangeBatch> {
		match self.deadline {
			Some(deadline) if now >= deadline => {
				self.deadline = None;
				let batch = self.batch.take();
				if let Some(batch) = &batch {
					debug!("Closing change batch with {} event(s)", batch.len());
				}
				batch
			}
			_ => None,
		}
	}

	/// Drop the open batch without reconciling it
	pub fn discard(&mut self) -> Option<ChangeBatch> {
		self.deadline = None;
		self.batch.take()
	}
}


// vim: ts=4
