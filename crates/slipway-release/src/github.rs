//! GitHub release API client.

use regex::Regex;
use serde::Deserialize;
use std::io::Write;
use std::time::Duration;

use slipway_types::store::Repository;

use crate::prelude::*;

const API_VERSION: &str = "2022-11-28";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_ASSET: &str = "application/octet-stream";

/// A release observed upstream, filtered down to the single matching asset.
#[derive(Debug, Clone)]
pub struct FetchedRelease {
	pub version: semver::Version,
	pub release_name: Box<str>,
	pub published_at: Timestamp,
	pub asset_id: Box<str>,
	pub asset_file_name: Box<str>,
	pub download_url: Box<str>,
	pub asset_size: i64,
}

#[derive(Debug, Deserialize)]
struct GhRelease {
	name: Option<String>,
	tag_name: String,
	prerelease: bool,
	published_at: Option<String>,
	#[serde(default)]
	assets: Vec<GhAsset>,
}

#[derive(Debug, Deserialize)]
struct GhAsset {
	id: u64,
	name: String,
	size: i64,
	browser_download_url: String,
}

/// The single asset whose file name matches the repository's pattern.
/// Zero or several matches disqualify the release; all recorded asset
/// fields (id, name, download URL, size) come from this one binding.
fn matching_asset<'a>(assets: &'a [GhAsset], pattern: &Regex) -> Option<&'a GhAsset> {
	let mut matches = assets.iter().filter(|asset| pattern.is_match(&asset.name));
	match (matches.next(), matches.next()) {
		(Some(asset), None) => Some(asset),
		_ => None,
	}
}

/// Parses a tag as a dotted numeric triple, tolerating a leading `v`.
/// Pre-release and build metadata disqualify the tag.
pub fn parse_version(tag: &str) -> Option<semver::Version> {
	let tag = tag.strip_prefix('v').unwrap_or(tag);
	let version = semver::Version::parse(tag).ok()?;
	if !version.pre.is_empty() || !version.build.is_empty() {
		return None;
	}
	Some(version)
}

pub struct GithubReleaseClient {
	client: reqwest::Client,
	api_base: String,
}

impl GithubReleaseClient {
	pub fn new() -> SwResult<Self> {
		let client = reqwest::Client::builder()
			.user_agent("slipway")
			.timeout(Duration::from_secs(60))
			.build()
			.map_err(|e| Error::ConfigError(format!("http client: {}", e)))?;
		Ok(Self { client, api_base: "https://api.github.com".to_string() })
	}

	/// Points the client at a different API base (tests).
	pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
		self.api_base = base.into();
		self
	}

	/// Fetches upstream releases for a repository: non-prereleases whose tag
	/// parses as a numeric triple and whose asset list contains exactly one
	/// asset matching the repository's pattern. At most the first 3 results.
	pub async fn fetch_releases(&self, repo: &Repository) -> SwResult<Vec<FetchedRelease>> {
		let pattern = Regex::new(&repo.release_file_pattern)
			.map_err(|e| Error::ValidationError(format!("release_file_pattern: {}", e)))?;

		let url = format!(
			"{}/repos/{}/releases?per_page={}",
			self.api_base, repo.repo, repo.retention
		);
		let mut request = self
			.client
			.get(&url)
			.header("Accept", ACCEPT_JSON)
			.header("X-GitHub-Api-Version", API_VERSION);
		if let Some(token) = repo.token.as_deref() {
			if !token.is_empty() {
				request = request.bearer_auth(token);
			}
		}

		let response = request
			.send()
			.await
			.map_err(|e| Error::Transient(format!("github request: {}", e)))?;
		if !response.status().is_success() {
			return Err(Error::Transient(format!(
				"unexpected GitHub response status: {}",
				response.status()
			)));
		}
		let releases: Vec<GhRelease> = response
			.json()
			.await
			.map_err(|e| Error::Transient(format!("github response: {}", e)))?;

		let mut fetched = Vec::new();
		for release in releases {
			if release.prerelease {
				continue;
			}
			let Some(version) = parse_version(&release.tag_name) else {
				debug!("skipping release with non-numeric tag {}", release.tag_name);
				continue;
			};

			let Some(asset) = matching_asset(&release.assets, &pattern) else {
				info!(
					"no single matching asset for release {}",
					release.name.as_deref().unwrap_or(&release.tag_name)
				);
				continue;
			};

			let published_at = release
				.published_at
				.as_deref()
				.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
				.map_or_else(Timestamp::now, |dt| Timestamp(dt.timestamp()));

			fetched.push(FetchedRelease {
				version,
				release_name: release.name.unwrap_or_else(|| release.tag_name.clone()).into(),
				published_at,
				asset_id: asset.id.to_string().into(),
				asset_file_name: asset.name.clone().into(),
				download_url: asset.browser_download_url.clone().into(),
				asset_size: asset.size,
			});
			if fetched.len() == 3 {
				break;
			}
		}
		Ok(fetched)
	}

	/// Downloads a release asset to a temp file and returns its handle.
	pub async fn download_asset(
		&self,
		repo: &Repository,
		asset_id: &str,
	) -> SwResult<tempfile::NamedTempFile> {
		let url = format!("{}/repos/{}/releases/assets/{}", self.api_base, repo.repo, asset_id);
		let mut request = self.client.get(&url).header("Accept", ACCEPT_ASSET);
		if let Some(token) = repo.token.as_deref() {
			if !token.is_empty() {
				request = request.bearer_auth(token);
			}
		}

		let mut response = request
			.send()
			.await
			.map_err(|e| Error::Transient(format!("asset download: {}", e)))?;
		if !response.status().is_success() {
			return Err(Error::Transient(format!(
				"unexpected GitHub response status: {}",
				response.status()
			)));
		}

		let mut file = tempfile::Builder::new().prefix("release-").suffix(".zip").tempfile()?;
		while let Some(chunk) =
			response.chunk().await.map_err(|e| Error::Transient(format!("asset read: {}", e)))?
		{
			file.write_all(&chunk)?;
		}
		file.flush()?;
		Ok(file)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn version_parsing_accepts_numeric_triples() {
		assert_eq!(parse_version("v1.2.3"), Some(semver::Version::new(1, 2, 3)));
		assert_eq!(parse_version("0.26.1"), Some(semver::Version::new(0, 26, 1)));
	}

	#[test]
	fn version_parsing_rejects_non_release_tags() {
		assert!(parse_version("nightly").is_none());
		assert!(parse_version("1.2").is_none());
		assert!(parse_version("v1.2.3-rc.1").is_none());
		assert!(parse_version("1.2.3+build5").is_none());
	}

	fn asset(id: u64, name: &str) -> GhAsset {
		GhAsset {
			id,
			name: name.to_string(),
			size: 1,
			browser_download_url: format!("https://example.test/assets/{}/{}", id, name),
		}
	}

	#[test]
	fn matched_asset_fields_belong_together() {
		let pattern = Regex::new("linux_amd64.zip$").unwrap();
		let assets = vec![
			asset(10, "appserver_darwin_arm64.zip"),
			asset(11, "appserver_linux_amd64.zip"),
			asset(12, "checksums.txt"),
		];

		let matched = matching_asset(&assets, &pattern).unwrap();
		assert_eq!(matched.id, 11);
		assert_eq!(matched.name, "appserver_linux_amd64.zip");
		assert_eq!(
			matched.browser_download_url,
			"https://example.test/assets/11/appserver_linux_amd64.zip"
		);
	}

	#[test]
	fn ambiguous_or_missing_assets_disqualify_the_release() {
		let pattern = Regex::new(".zip$").unwrap();
		let assets = vec![asset(1, "a.zip"), asset(2, "b.zip")];
		assert!(matching_asset(&assets, &pattern).is_none());

		let pattern = Regex::new("linux_amd64.zip$").unwrap();
		let assets = vec![asset(3, "checksums.txt")];
		assert!(matching_asset(&assets, &pattern).is_none());
	}
}

// vim: ts=4
