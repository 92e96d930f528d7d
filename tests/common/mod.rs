/// In-memory data-mover shared by the integration tests
///
/// Holds one tree per side, preserves size and modification time on copy the
/// way rclone does, records every call, and can inject failures and delays.
#[allow(dead_code)]
pub mod memory {
	use async_trait::async_trait;
	use chrono::{DateTime, TimeZone, Utc};
	use std::collections::{BTreeMap, BTreeSet};
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
	use std::sync::{Arc, Mutex};
	use std::time::Duration;

	use tidesync::error::MoverError;
	use tidesync::mover::{DataMover, Location, MoverResult};
	use tidesync::types::{FileEntry, Side, Snapshot, Snapshots};

	/// Fixed base timestamp plus `secs`
	pub fn ts(secs: i64) -> DateTime<Utc> {
		Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
	}

	#[derive(Default)]
	struct Trees {
		local: BTreeMap<String, FileEntry>,
		remote: BTreeMap<String, FileEntry>,
	}

	impl Trees {
		fn side(&mut self, side: Side) -> &mut BTreeMap<String, FileEntry> {
			match side {
				Side::Local => &mut self.local,
				Side::Remote => &mut self.remote,
			}
		}

		fn ensure_parents(&mut self, side: Side, path: &str) {
			let mut parent = path;
			while let Some(i) = parent.rfind('/') {
				parent = &parent[..i];
				self.side(side)
					.entry(parent.to_string())
					.or_insert_with(|| FileEntry::dir(parent, side, ts(0)));
			}
		}
	}

	#[derive(Default)]
	pub struct MemoryMover {
		trees: Mutex<Trees>,
		failing: Mutex<BTreeSet<(Side, String)>>,
		calls: Mutex<Vec<String>>,
		delay: Mutex<Duration>,
		in_flight: AtomicUsize,
		max_in_flight: AtomicUsize,
		offline: AtomicBool,
	}

	struct FlightGuard<'a>(&'a AtomicUsize);

	impl Drop for FlightGuard<'_> {
		fn drop(&mut self) {
			self.0.fetch_sub(1, Ordering::SeqCst);
		}
	}

	impl MemoryMover {
		pub fn new() -> Arc<Self> {
			Arc::new(Self::default())
		}

		pub fn put_file(&self, side: Side, path: &str, size: u64, mtime: DateTime<Utc>) {
			let mut trees = self.trees.lock().unwrap();
			trees.ensure_parents(side, path);
			trees.side(side).insert(path.to_string(), FileEntry::file(path, side, size, mtime));
		}

		pub fn put_dir(&self, side: Side, path: &str) {
			let mut trees = self.trees.lock().unwrap();
			trees.ensure_parents(side, path);
			trees.side(side).insert(path.to_string(), FileEntry::dir(path, side, ts(0)));
		}

		pub fn remove(&self, side: Side, path: &str) {
			self.trees.lock().unwrap().side(side).remove(path);
		}

		pub fn get(&self, side: Side, path: &str) -> Option<FileEntry> {
			self.trees.lock().unwrap().side(side).get(path).cloned()
		}

		pub fn contains(&self, side: Side, path: &str) -> bool {
			self.get(side, path).is_some()
		}

		pub fn paths(&self, side: Side) -> Vec<String> {
			self.trees.lock().unwrap().side(side).keys().cloned().collect()
		}

		pub fn snapshot(&self, side: Side) -> Snapshot {
			let entries: Vec<FileEntry> = self.trees.lock().unwrap().side(side).values().cloned().collect();
			Snapshot::from_entries(side, entries)
		}

		pub fn snapshots(&self) -> Snapshots {
			Snapshots::new(Arc::new(self.snapshot(Side::Local)), Arc::new(self.snapshot(Side::Remote)))
		}

		/// Every write to `path` on `side` fails from now on
		pub fn fail_on(&self, side: Side, path: &str) {
			self.failing.lock().unwrap().insert((side, path.to_string()));
		}

		pub fn clear_failures(&self) {
			self.failing.lock().unwrap().clear();
		}

		/// Every operation sleeps this long before completing
		pub fn set_delay(&self, delay: Duration) {
			*self.delay.lock().unwrap() = delay;
		}

		/// Listings fail while offline
		pub fn set_offline(&self, offline: bool) {
			self.offline.store(offline, Ordering::SeqCst);
		}

		pub fn calls(&self) -> Vec<String> {
			self.calls.lock().unwrap().clone()
		}

		pub fn max_concurrency(&self) -> usize {
			self.max_in_flight.load(Ordering::SeqCst)
		}

		async fn enter(&self, call: String) -> FlightGuard<'_> {
			self.calls.lock().unwrap().push(call);
			let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
			self.max_in_flight.fetch_max(now, Ordering::SeqCst);
			let guard = FlightGuard(&self.in_flight);
			let delay = *self.delay.lock().unwrap();
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
			guard
		}

		fn check_writable(&self, at: &Location) -> MoverResult<()> {
			if self.failing.lock().unwrap().contains(&(at.side, at.path.clone())) {
				return Err(MoverError::Failed {
					operation: "write".to_string(),
					status: Some(1),
					stderr: format!("injected failure on {}", at),
				});
			}
			Ok(())
		}

		fn copy_entry(&self, from: &Location, to: &Location) -> MoverResult<()> {
			self.check_writable(to)?;
			let mut trees = self.trees.lock().unwrap();
			let source = match trees.side(from.side).get(&from.path) {
				Some(entry) if !entry.is_dir() => entry.clone(),
				_ => return Err(MoverError::NotFound { path: from.to_string() }),
			};
			if trees.side(to.side).get(&to.path).map(|e| e.is_dir()).unwrap_or(false) {
				return Err(MoverError::Failed {
					operation: "copyto".to_string(),
					status: Some(1),
					stderr: "is a directory".to_string(),
				});
			}
			trees.ensure_parents(to.side, &to.path);
			let mut copy = source;
			copy.path = to.path.clone();
			copy.side = to.side;
			trees.side(to.side).insert(to.path.clone(), copy);
			Ok(())
		}
	}

	#[async_trait]
	impl DataMover for MemoryMover {
		async fn list(&self, side: Side) -> MoverResult<Vec<FileEntry>> {
			let _guard = self.enter(format!("list {}", side)).await;
			if self.offline.load(Ordering::SeqCst) {
				return Err(MoverError::Failed {
					operation: "lsjson".to_string(),
					status: Some(1),
					stderr: "connection refused".to_string(),
				});
			}
			Ok(self.trees.lock().unwrap().side(side).values().cloned().collect())
		}

		async fn copy(&self, from: &Location, to: &Location) -> MoverResult<()> {
			let _guard = self.enter(format!("copy {} -> {}", from, to)).await;
			self.copy_entry(from, to)
		}

		async fn move_to(&self, from: &Location, to: &Location) -> MoverResult<()> {
			let _guard = self.enter(format!("move {} -> {}", from, to)).await;
			self.check_writable(from)?;
			self.copy_entry(from, to)?;
			self.trees.lock().unwrap().side(from.side).remove(&from.path);
			Ok(())
		}

		async fn mkdir(&self, at: &Location) -> MoverResult<()> {
			let _guard = self.enter(format!("mkdir {}", at)).await;
			self.check_writable(at)?;
			let mut trees = self.trees.lock().unwrap();
			match trees.side(at.side).get(&at.path) {
				Some(entry) if !entry.is_dir() => Err(MoverError::Failed {
					operation: "mkdir".to_string(),
					status: Some(1),
					stderr: "file exists".to_string(),
				}),
				Some(_) => Ok(()),
				None => {
					trees.ensure_parents(at.side, &at.path);
					trees.side(at.side).insert(at.path.clone(), FileEntry::dir(&at.path, at.side, ts(0)));
					Ok(())
				}
			}
		}

		async fn delete(&self, at: &Location) -> MoverResult<()> {
			let _guard = self.enter(format!("delete {}", at)).await;
			self.check_writable(at)?;
			let mut trees = self.trees.lock().unwrap();
			match trees.side(at.side).get(&at.path) {
				Some(entry) if !entry.is_dir() => {
					trees.side(at.side).remove(&at.path);
					Ok(())
				}
				_ => Err(MoverError::NotFound { path: at.to_string() }),
			}
		}

		async fn rmdir(&self, at: &Location) -> MoverResult<()> {
			let _guard = self.enter(format!("rmdir {}", at)).await;
			self.check_writable(at)?;
			let mut trees = self.trees.lock().unwrap();
			let prefix = format!("{}/", at.path);
			let tree = trees.side(at.side);
			if tree.keys().any(|p| p.starts_with(&prefix)) {
				return Err(MoverError::Failed {
					operation: "rmdir".to_string(),
					status: Some(1),
					stderr: "directory not empty".to_string(),
				});
			}
			match tree.get(&at.path) {
				Some(entry) if entry.is_dir() => {
					tree.remove(&at.path);
					Ok(())
				}
				_ => Err(MoverError::NotFound { path: at.to_string() }),
			}
		}

		async fn dedupe(&self, side: Side) -> MoverResult<()> {
			let _guard = self.enter(format!("dedupe {}", side)).await;
			Ok(())
		}

		async fn version(&self) -> MoverResult<String> {
			Ok("rclone v1.66.0 (memory)".to_string())
		}
	}
}

// vim: ts=4
