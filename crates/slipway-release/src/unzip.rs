//! Zip extraction with a path-traversal guard.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::prelude::*;

/// Extracts `source` into `destination`, returning the relative paths of
/// the extracted files (directories omitted). Entries whose normalized
/// destination would escape the target directory are rejected.
pub fn extract(source: &Path, destination: &Path) -> SwResult<Vec<PathBuf>> {
	let reader = File::open(source)?;
	let mut archive = zip::ZipArchive::new(reader)
		.map_err(|e| Error::ValidationError(format!("failed to open zip file: {}", e)))?;

	std::fs::create_dir_all(destination)?;

	let mut extracted = Vec::new();
	for index in 0..archive.len() {
		let mut entry = archive
			.by_index(index)
			.map_err(|e| Error::ValidationError(format!("failed to read zip entry: {}", e)))?;

		let Some(relative) = entry.enclosed_name() else {
			return Err(Error::Traversal(entry.name().to_string()));
		};
		let target = destination.join(&relative);

		if entry.is_dir() {
			std::fs::create_dir_all(&target)?;
			continue;
		}

		if let Some(parent) = target.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let mut output = File::create(&target)?;
		std::io::copy(&mut entry, &mut output)?;
		extracted.push(relative);
	}

	Ok(extracted)
}


// vim: ts=4
