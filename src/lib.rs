//! # tidesync - Change-Driven Bidirectional Sync over rclone
//!
//! tidesync keeps a local directory and an rclone remote in sync without any
//! sync database. Local changes arrive through filesystem notifications,
//! remote changes through periodic listings; bursts are batched, reconciled
//! against both current snapshots, and turned into an ordered plan of rclone
//! operations. Conflicting edits are kept side by side under
//! `.local-conflict` / `.remote-conflict` names, never deleted.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tidesync::{config::Config, scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("gdrive:Sync", "/home/me/gdrive");
//!     let summary = scheduler::run(config).await?;
//!     println!("{} cycle(s)", summary.cycles);
//!     Ok(())
//! }
//! ```
//!
//! ## Reconciling Without the Loop
//!
//! ```rust,ignore
//! use tidesync::{batch::ChangeBatch, reconcile::Reconciler};
//!
//! let outcome = Reconciler::new(window).reconcile(&ChangeBatch::startup(), &snapshots);
//! for action in outcome.plan.iter() {
//!     println!("{}", action);
//! }
//! ```

pub mod batch;
pub mod config;
pub mod conflict;
pub mod error;
pub mod exclusion;
pub mod executor;
pub mod logging;
pub mod mover;
pub mod plan;
pub mod poller;
pub mod reconcile;
pub mod scheduler;
pub mod types;
pub mod util;
pub mod utils;
pub mod watcher;

// Re-export commonly used types and functions
pub use config::Config;
pub use error::{ConfigError, MoverError, SyncError};
pub use types::{ChangeEvent, ChangeKind, FileEntry, Side, Snapshot, Snapshots};

// vim: ts=4
