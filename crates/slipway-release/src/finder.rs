//! Locates the executable inside an extracted artifact.

use regex::Regex;
use std::path::{Path, PathBuf};

use crate::prelude::*;

/// Returns the first file in `<download_dir>/<repository_id>/<version>/`
/// whose name matches `exec_pattern`.
pub fn find_binary(
	download_dir: &Path,
	repository_id: &str,
	version: &str,
	exec_pattern: &Regex,
) -> SwResult<PathBuf> {
	let repo_dir = download_dir.join(repository_id).join(version);
	let entries = std::fs::read_dir(&repo_dir).map_err(|err| {
		Error::BinaryNotFound(format!("failed to read directory {:?}: {}", repo_dir, err))
	})?;

	for entry in entries {
		let entry = entry?;
		if entry.file_type()?.is_dir() {
			continue;
		}
		let name = entry.file_name().to_string_lossy().into_owned();
		if exec_pattern.is_match(&name) {
			return Ok(repo_dir.join(name));
		}
	}

	Err(Error::BinaryNotFound(format!(
		"no binary matching pattern {} in repository {}",
		exec_pattern, repository_id
	)))
}


// vim: ts=4
