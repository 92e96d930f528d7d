//! Path normalization and human-readable duration parsing

use std::path::{Component, Path};
use std::time::Duration;

/// Normalize a `/`-separated relative path.
///
/// Empty and `.` components are dropped, `\` is treated as a separator.
/// Returns `None` for the root itself or for paths escaping the root.
pub fn normalize_path(path: &str) -> Option<String> {
	let mut parts: Vec<&str> = Vec::new();
	for part in path.split(|c| c == '/' || c == '\\') {
		match part {
			"" | "." => continue,
			".." => return None,
			part => parts.push(part),
		}
	}
	if parts.is_empty() {
		None
	} else {
		Some(parts.join("/"))
	}
}

/// Express `path` relative to `root` as a normalized path
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
	let rel = path.strip_prefix(root).ok()?;
	let mut parts = Vec::new();
	for component in rel.components() {
		match component {
			Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
			Component::CurDir => continue,
			_ => return None,
		}
	}
	if parts.is_empty() {
		None
	} else {
		Some(parts.join("/"))
	}
}

/// Number of components in a normalized path
pub fn depth(path: &str) -> usize {
	path.split('/').count()
}

/// Parse a human-readable duration such as `1s`, `500ms`, `1m30s`,
/// `2 hours` or `1.5s`. Bare numbers are seconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
	let s = text.trim().to_lowercase();
	if s.is_empty() {
		return Err("Empty duration".to_string());
	}

	let mut nanos: f64 = 0.0;
	let mut rest = s.as_str();
	while !rest.is_empty() {
		let num_len =
			rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
		if num_len == 0 {
			return Err(format!("Invalid duration: {}", text));
		}
		let value: f64 =
			rest[..num_len].parse().map_err(|_| format!("Invalid duration: {}", text))?;
		rest = rest[num_len..].trim_start();

		let unit_len = rest.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(rest.len());
		let factor = unit_nanos(&rest[..unit_len])
			.ok_or_else(|| format!("Unknown duration unit '{}' in: {}", &rest[..unit_len], text))?;
		nanos += value * factor;
		rest = rest[unit_len..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());
	}

	if !nanos.is_finite() || nanos > u64::MAX as f64 {
		return Err(format!("Duration out of range: {}", text));
	}
	Ok(Duration::from_nanos(nanos.round() as u64))
}

fn unit_nanos(unit: &str) -> Option<f64> {
	let factor = match unit {
		"ns" | "nanosecond" | "nanoseconds" => 1.0,
		"us" | "microsecond" | "microseconds" => 1e3,
		"ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1e6,
		"" | "s" | "sec" | "secs" | "second" | "seconds" => 1e9,
		"m" | "min" | "mins" | "minute" | "minutes" => 60.0 * 1e9,
		"h" | "hr" | "hrs" | "hour" | "hours" => 3600.0 * 1e9,
		"d" | "day" | "days" => 86_400.0 * 1e9,
		"w" | "wk" | "wks" | "week" | "weeks" => 604_800.0 * 1e9,
		_ => return None,
	};
	Some(factor)
}

/// Render a duration the way `parse_duration` reads it back
pub fn format_duration(duration: Duration) -> String {
	if duration.subsec_nanos() == 0 {
		format!("{}s", duration.as_secs())
	} else if duration.subsec_nanos() % 1_000_000 == 0 {
		format!("{}ms", duration.as_millis())
	} else {
		format!("{}ns", duration.as_nanos())
	}
}


// vim: ts=4
