//! Release repository management.

use axum::{
	extract::{Path, State},
	Json,
};
use regex::Regex;
use serde::Deserialize;

use slipway_types::store::{CreateRepository, Release, Repository};

use crate::auth::Auth;
use crate::prelude::*;

pub async fn list(_auth: Auth, State(app): State<App>) -> SwResult<Json<Vec<Repository>>> {
	Ok(Json(app.store.list_active_repositories().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateRepositoryRequest {
	pub repo: String,
	pub token: Option<String>,
	pub release_file_pattern: String,
	pub exec_file_pattern: String,
	#[serde(default = "default_retention")]
	pub retention: u8,
}

fn default_retention() -> u8 {
	3
}

pub async fn create(
	_auth: Auth,
	State(app): State<App>,
	Json(body): Json<CreateRepositoryRequest>,
) -> SwResult<Json<Repository>> {
	if body.repo.split('/').count() != 2 {
		return Err(Error::ValidationError(format!(
			"repo must be owner/name: {}",
			body.repo
		)));
	}
	for (key, pattern) in [
		("release_file_pattern", &body.release_file_pattern),
		("exec_file_pattern", &body.exec_file_pattern),
	] {
		Regex::new(pattern)
			.map_err(|err| Error::ValidationError(format!("{}: {}", key, err)))?;
	}
	if !(1..=6).contains(&body.retention) {
		return Err(Error::ValidationError("retention must be 1..6".into()));
	}

	Ok(Json(
		app.store
			.create_repository(CreateRepository {
				repo: &body.repo,
				token: body.token.as_deref(),
				release_file_pattern: &body.release_file_pattern,
				exec_file_pattern: &body.exec_file_pattern,
				retention: body.retention,
			})
			.await?,
	))
}

pub async fn releases(
	_auth: Auth,
	State(app): State<App>,
	Path(repository_id): Path<String>,
) -> SwResult<Json<Vec<Release>>> {
	app.store.find_repository(&repository_id).await?;
	Ok(Json(app.store.list_releases(&repository_id).await?))
}

// vim: ts=4
