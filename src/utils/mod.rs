//! Utility modules for common functionality

pub mod signal;

pub use signal::spawn_shutdown_listener;

// vim: ts=4
