//! Conflict marker naming
//!
//! `notes.txt` becomes `notes.local-conflict.txt` / `notes.remote-conflict.txt`.
//! Names without an extension, or starting with a dot, get the tag appended
//! (`.bashrc.local-conflict`). Taken names get a counter: `notes.local-conflict-1.txt`.

use crate::types::Side;

/// Marker tag for one side, e.g. `local-conflict`
pub fn marker_tag(side: Side) -> String {
	format!("{}-conflict", side.label())
}

/// Marker name for `path` on `side`; `counter` 0 means no numeric suffix
pub fn marker_name(path: &str, side: Side, counter: usize) -> String {
	let (dir, name) = match path.rfind('/') {
		Some(i) => (&path[..=i], &path[i + 1..]),
		None => ("", path),
	};

	let mut tag = marker_tag(side);
	if counter > 0 {
		tag = format!("{}-{}", tag, counter);
	}

	match name.rfind('.') {
		Some(dot) if dot > 0 => format!("{}{}.{}{}", dir, &name[..dot], tag, &name[dot..]),
		_ => format!("{}{}.{}", dir, name, tag),
	}
}

/// First marker name for `path` on `side` that `taken` does not reject
pub fn free_marker(path: &str, side: Side, taken: impl Fn(&str) -> bool) -> String {
	let mut counter = 0;
	loop {
		let candidate = marker_name(path, side, counter);
		if !taken(&candidate) {
			return candidate;
		}
		counter += 1;
	}
}

/// Whether `path` already carries a conflict marker from either side
pub fn is_marker(path: &str) -> bool {
	let name = path.rsplit('/').next().unwrap_or(path);
	[Side::Local, Side::Remote].iter().any(|side| name.contains(&format!(".{}", marker_tag(*side))))
}


// vim: ts=4
