//! Release sync use-case: observe upstream releases, record the new ones,
//! and materialize missing artifacts on disk.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use slipway_types::store::{InsertRelease, Release, Repository, StoreAdapter};

use crate::artifact::ArtifactStorage;
use crate::github::{FetchedRelease, GithubReleaseClient};
use crate::prelude::*;
use crate::unzip;

pub struct ReleaseSync {
	store: Arc<dyn StoreAdapter>,
	github: GithubReleaseClient,
	artifacts: ArtifactStorage,
}

/// Releases present upstream but not yet recorded, compared by version.
pub fn diff_releases<'a>(
	upstream: &'a [FetchedRelease],
	recorded: &[Release],
) -> Vec<&'a FetchedRelease> {
	let known: HashSet<&str> = recorded.iter().map(|r| r.version.as_ref()).collect();
	upstream
		.iter()
		.filter(|release| !known.contains(release.version.to_string().as_str()))
		.collect()
}

impl ReleaseSync {
	pub fn new(
		store: Arc<dyn StoreAdapter>,
		github: GithubReleaseClient,
		artifacts: ArtifactStorage,
	) -> Self {
		Self { store, github, artifacts }
	}

	async fn sync_repository(&self, repo: &Repository) -> SwResult<()> {
		let upstream = self.github.fetch_releases(repo).await?;
		let recorded = self.store.list_releases(&repo.id).await?;

		for release in diff_releases(&upstream, &recorded) {
			let version = release.version.to_string();
			info!("Recording new release {} {}", repo.repo, version);
			self.store
				.insert_release(InsertRelease {
					repository_id: &repo.id,
					version: &version,
					release_name: &release.release_name,
					published_at: release.published_at,
					asset_id: &release.asset_id,
					asset_file_name: &release.asset_file_name,
					download_url: &release.download_url,
					asset_size: release.asset_size,
				})
				.await?;
		}

		// Materialize artifacts for every recorded release still missing
		// from disk; listing also garbage-collects emptied version dirs
		let on_disk: HashSet<String> = self
			.artifacts
			.versions(&repo.id)?
			.into_iter()
			.map(|version| version.to_string())
			.collect();
		for release in self.store.list_releases(&repo.id).await? {
			if on_disk.contains(release.version.as_ref()) {
				continue;
			}
			if let Err(err) = self.download_release(repo, &release).await {
				error!(
					"failed to materialize artifact {} {}: {}",
					repo.repo, release.version, err
				);
			}
		}

		Ok(())
	}

	async fn download_release(&self, repo: &Repository, release: &Release) -> SwResult<()> {
		info!("Downloading release asset {} {}", repo.repo, release.version);
		let archive = self.github.download_asset(repo, &release.asset_id).await?;

		let extract_dir = tempfile::tempdir()?;
		let files = unzip::extract(archive.path(), extract_dir.path())?;

		let prefix = Path::new(repo.id.as_ref()).join(release.version.as_ref());
		for relative in files {
			self.artifacts.save(&prefix.join(&relative), &extract_dir.path().join(&relative))?;
		}
		info!("Artifact ready: {} {}", repo.repo, release.version);
		Ok(())
	}

	/// One sync tick over every enabled repository.
	pub async fn run(&self) -> SwResult<()> {
		let repositories = self.store.list_active_repositories().await?;
		for repo in repositories {
			if let Err(err) = self.sync_repository(&repo).await {
				error!("release sync failed for {}: {}", repo.repo, err);
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fetched(version: &str) -> FetchedRelease {
		FetchedRelease {
			version: semver::Version::parse(version).unwrap(),
			release_name: format!("Release {}", version).into(),
			published_at: Timestamp::now(),
			asset_id: "1".into(),
			asset_file_name: "app.zip".into(),
			download_url: "https://example.test/app.zip".into(),
			asset_size: 1,
		}
	}

	fn recorded(version: &str) -> Release {
		Release {
			id: version.into(),
			repository_id: "repo1".into(),
			version: version.into(),
			release_name: "".into(),
			published_at: Timestamp::now(),
			asset_id: "1".into(),
			asset_file_name: "app.zip".into(),
			download_url: "".into(),
			asset_size: 1,
		}
	}

	#[test]
	fn diff_keeps_only_unknown_versions() {
		let upstream = vec![fetched("1.0.0"), fetched("1.2.0"), fetched("2.0.0")];
		let known = vec![recorded("1.0.0"), recorded("2.0.0")];

		let fresh = diff_releases(&upstream, &known);
		assert_eq!(fresh.len(), 1);
		assert_eq!(fresh[0].version.to_string(), "1.2.0");
	}

	#[test]
	fn diff_of_fully_known_upstream_is_empty() {
		let upstream = vec![fetched("1.0.0")];
		let known = vec![recorded("1.0.0")];
		assert!(diff_releases(&upstream, &known).is_empty());
	}
}

// vim: ts=4
