//! Static proxy entry management.

use axum::{extract::State, Json};
use serde::Deserialize;

use slipway_types::store::{CreateProxyEntry, ProxyEntry};

use crate::auth::Auth;
use crate::prelude::*;

pub async fn list(_auth: Auth, State(app): State<App>) -> SwResult<Json<Vec<ProxyEntry>>> {
	Ok(Json(app.store.list_proxy_entries().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateProxyEntryRequest {
	pub name: String,
	pub target_url: String,
	#[serde(default = "default_enabled")]
	pub enabled: bool,
}

fn default_enabled() -> bool {
	true
}

pub async fn create(
	_auth: Auth,
	State(app): State<App>,
	Json(body): Json<CreateProxyEntryRequest>,
) -> SwResult<Json<ProxyEntry>> {
	if !body.target_url.starts_with("http://") && !body.target_url.starts_with("https://") {
		return Err(Error::ValidationError(format!(
			"invalid target_url: {}",
			body.target_url
		)));
	}
	Ok(Json(
		app.store
			.create_proxy_entry(CreateProxyEntry {
				name: &body.name,
				target_url: &body.target_url,
				enabled: body.enabled,
			})
			.await?,
	))
}

// vim: ts=4
