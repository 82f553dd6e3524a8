//! Versioned artifact tree: `<download_dir>/<repository_id>/<version>/...`.
//!
//! Presence on disk is authoritative; empty version directories are garbage
//! collected when listing. Files that sniff as executables get mode 0755.

use std::path::{Path, PathBuf};

use crate::prelude::*;

pub struct ArtifactStorage {
	base_dir: PathBuf,
}

impl ArtifactStorage {
	pub fn new(base_dir: impl Into<PathBuf>) -> Self {
		Self { base_dir: base_dir.into() }
	}

	pub fn version_dir(&self, repository_id: &str, version: &str) -> PathBuf {
		self.base_dir.join(repository_id).join(version)
	}

	fn clean_empty_dirs(&self, repository_id: &str) -> SwResult<()> {
		let repo_dir = self.base_dir.join(repository_id);
		let entries = match std::fs::read_dir(&repo_dir) {
			Ok(entries) => entries,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(err) => return Err(err.into()),
		};

		for entry in entries {
			let entry = entry?;
			if !entry.file_type()?.is_dir() {
				continue;
			}
			let dir = entry.path();
			if std::fs::read_dir(&dir)?.next().is_none() {
				if let Err(err) = std::fs::remove_dir(&dir) {
					warn!("failed to remove empty artifact dir {:?}: {}", dir, err);
				}
			}
		}
		Ok(())
	}

	/// Versions with a non-empty artifact directory for the repository.
	pub fn versions(&self, repository_id: &str) -> SwResult<Vec<semver::Version>> {
		if let Err(err) = self.clean_empty_dirs(repository_id) {
			warn!("failed to clean empty artifact directories: {}", err);
		}

		let repo_dir = self.base_dir.join(repository_id);
		let entries = match std::fs::read_dir(&repo_dir) {
			Ok(entries) => entries,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
			Err(err) => return Err(err.into()),
		};

		let mut versions = Vec::new();
		for entry in entries {
			let entry = entry?;
			if !entry.file_type()?.is_dir() {
				continue;
			}
			let name = entry.file_name().to_string_lossy().into_owned();
			match semver::Version::parse(&name) {
				Ok(version) => versions.push(version),
				Err(err) => warn!("invalid version directory {}: {}", name, err),
			}
		}
		Ok(versions)
	}

	pub fn has_version(&self, repository_id: &str, version: &str) -> bool {
		std::fs::read_dir(self.version_dir(repository_id, version))
			.map(|mut entries| entries.next().is_some())
			.unwrap_or(false)
	}

	/// Copies one extracted file into place and marks it executable when its
	/// content sniffs as a binary.
	pub fn save(&self, relative_path: &Path, source: &Path) -> SwResult<PathBuf> {
		let target = self.base_dir.join(relative_path);
		if let Some(parent) = target.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::copy(source, &target)?;

		if is_executable(&target)? {
			set_executable(&target)?;
		}
		Ok(target)
	}
}

/// Sniffs the file head. Known executable formats and unrecognized
/// octet-stream content both count; recognized non-executable formats
/// (archives, text with a known signature, images) do not.
fn is_executable(path: &Path) -> SwResult<bool> {
	use std::io::Read;

	let mut head = [0u8; 1024];
	let mut file = std::fs::File::open(path)?;
	let n = file.read(&mut head)?;

	Ok(match infer::get(&head[..n]) {
		Some(kind) => {
			if cfg!(windows) {
				kind.mime_type() == "application/vnd.microsoft.portable-executable"
			} else {
				matches!(
					kind.mime_type(),
					"application/x-executable" | "application/x-sharedlib"
				)
			}
		}
		// No known signature: treated as octet-stream, like the upstream
		// release binaries that ship without a recognizable container
		None => !cfg!(windows),
	})
}

#[cfg(unix)]
fn set_executable(path: &Path) -> SwResult<()> {
	use std::os::unix::fs::PermissionsExt;
	std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
	Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> SwResult<()> {
	Ok(())
}


// vim: ts=4
