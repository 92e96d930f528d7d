//! Exclusion system shared by the watcher, the poller and the initial scans

mod patterns;

pub use patterns::PatternMatcher;

// vim: ts=4
