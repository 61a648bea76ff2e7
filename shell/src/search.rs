use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use tracing::debug;

use crate::builtin;

const PATH_KEY: &str = "PATH";

/// Directories named by a colon-separated search path, in order.
///
/// Nothing is cached: every lookup enumerates the directories again, so
/// programs installed while the shell runs are found without a rehash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
	dirs: Vec<PathBuf>,
}

impl SearchPath {
	pub fn new(value: &OsStr) -> SearchPath {
		SearchPath { dirs: env::split_paths(value).collect() }
	}

	pub fn from_env() -> SearchPath {
		SearchPath::new(&env::var_os(PATH_KEY).unwrap_or_else(OsString::new))
	}

	pub fn dirs(&self) -> &[PathBuf] {
		&self.dirs
	}

	fn find_in(dir: &Path, name: &OsStr) -> io::Result<Option<PathBuf>> {
		for entry in fs::read_dir(dir)? {
			let entry = entry?;
			if entry.file_name() == name {
				return Ok(Some(dir.join(name)));
			}
		}
		Ok(None)
	}

	/// First `dir/name` whose directory listing contains `name` exactly.
	pub fn lookup(&self, name: &str) -> Option<PathBuf> {
		if name.is_empty() {
			return None;
		}
		let name = OsStr::new(name);
		for dir in &self.dirs {
			match SearchPath::find_in(dir, name) {
				Ok(Some(path)) => return Some(path),
				Ok(None) => {},
				Err(e) => debug!(dir = %dir.display(), error = %e, "skipping search directory"),
			}
		}
		None
	}

	/// Entry names starting with `prefix`, across every directory.
	pub fn entries_with_prefix(&self, prefix: &str) -> BTreeSet<String> {
		let mut found = BTreeSet::new();
		for dir in &self.dirs {
			let entries = match fs::read_dir(dir) {
				Ok(entries) => entries,
				Err(_) => continue,
			};
			for entry in entries.flatten() {
				if let Ok(name) = entry.file_name().into_string() {
					if name.starts_with(prefix) {
						found.insert(name);
					}
				}
			}
		}
		found
	}
}

pub fn resolve(name: &str) -> Option<PathBuf> {
	let search_path = SearchPath::from_env();
	let found = search_path.lookup(name);
	debug!(command = name, dirs = search_path.dirs().len(), found = ?found, "resolved command");
	found
}

/// Completion candidates: built-in names plus search-path entries.
pub fn complete(search_path: &SearchPath, prefix: &str) -> Vec<String> {
	let mut found = search_path.entries_with_prefix(prefix);
	for name in builtin::names() {
		if name.starts_with(prefix) {
			found.insert(name.to_string());
		}
	}
	found.into_iter().collect()
}
