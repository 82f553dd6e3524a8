//! Setup and session endpoints: proxy configuration for the UI, initial
//! superuser bootstrap and login.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth;
use crate::prelude::*;

pub async fn proxy_configs(State(app): State<App>) -> Json<serde_json::Value> {
	Json(json!({
		"use_https": app.config.is_https_enabled(),
		"http_port": app.config.http_port(),
		"https_port": app.config.https_port(),
		"base_domain": app.config.domain(),
	}))
}

pub async fn admin_exists(State(app): State<App>) -> SwResult<Json<serde_json::Value>> {
	let total = app.store.count_superusers().await?;
	let message = if total == 0 { "no" } else { "yes" };
	Ok(Json(json!({ "message": message })))
}

#[derive(Debug, Deserialize)]
pub struct AdminCredentials {
	pub email: String,
	pub password: String,
}

/// Creates the initial superuser together with a matching user row.
pub async fn create_admin(
	State(app): State<App>,
	Json(body): Json<AdminCredentials>,
) -> SwResult<Json<serde_json::Value>> {
	if body.email.is_empty() || !body.email.contains('@') {
		return Err(Error::ValidationError("invalid email".into()));
	}
	if body.password.len() < 8 {
		return Err(Error::ValidationError("password must be at least 8 characters".into()));
	}
	if app.store.count_superusers().await? > 0 {
		return Err(Error::AlreadyExists("superuser".into()));
	}

	app.store.create_superuser_with_user(&body.email, &body.password).await?;
	info!("initial superuser created: {}", body.email);
	Ok(Json(json!({})))
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
	pub token: String,
}

pub async fn login(
	State(app): State<App>,
	Json(body): Json<AdminCredentials>,
) -> SwResult<Json<LoginResponse>> {
	if !app.store.check_superuser_password(&body.email, &body.password).await? {
		return Err(Error::Unauthorized);
	}
	let token = auth::issue_token(&app.jwt_secret, &body.email)?;
	Ok(Json(LoginResponse { token }))
}

// vim: ts=4
