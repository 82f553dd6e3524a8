//! Service and command management.
//!
//! Creation forces `status=idle` and enqueues a start command; tombstoning
//! a service enqueues a stop command. Status itself is owned by the
//! supervisor and never writable here.

use axum::{
	extract::{Path, State},
	Json,
};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use slipway_runner::logstore::ServiceLog;
use slipway_types::store::{
	CommandAction, CreateService, RestartPolicy, Service, ServiceCommand, UpdateService,
};

use crate::auth::Auth;
use crate::prelude::*;

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
	pub name: String,
	pub release_id: String,
	#[serde(default)]
	pub restart_policy: Option<String>,
	pub boot_user_email: Option<String>,
	pub boot_user_password: Option<String>,
}

pub async fn list(_auth: Auth, State(app): State<App>) -> SwResult<Json<Vec<Service>>> {
	Ok(Json(app.store.list_services().await?))
}

pub async fn create(
	_auth: Auth,
	State(app): State<App>,
	Json(body): Json<CreateServiceRequest>,
) -> SwResult<Json<Service>> {
	if body.name.is_empty() {
		return Err(Error::ValidationError("name must not be empty".into()));
	}
	app.store.find_release(&body.release_id).await?;

	let restart_policy = RestartPolicy::parse_lenient(body.restart_policy.as_deref().unwrap_or(""));
	let service = app
		.store
		.create_service(CreateService {
			name: &body.name,
			release_id: &body.release_id,
			restart_policy,
			boot_user_email: body.boot_user_email.as_deref(),
			boot_user_password: body.boot_user_password.as_deref(),
		})
		.await?;

	// A freshly created service is started on the next supervisor tick
	app.store.enqueue_command(&service.id, CommandAction::Start).await?;
	Ok(Json(service))
}

pub async fn get(
	_auth: Auth,
	State(app): State<App>,
	Path(id): Path<String>,
) -> SwResult<Json<Service>> {
	Ok(Json(app.store.find_service(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
	pub name: Option<String>,
	pub restart_policy: Option<String>,
	#[serde(default)]
	pub deleted: bool,
}

pub async fn update(
	_auth: Auth,
	State(app): State<App>,
	Path(id): Path<String>,
	Json(body): Json<UpdateServiceRequest>,
) -> SwResult<Json<Service>> {
	let deleted = body.deleted.then(Timestamp::now);
	let service = app
		.store
		.update_service(
			&id,
			UpdateService {
				name: body.name.as_deref(),
				restart_policy: body
					.restart_policy
					.as_deref()
					.map(RestartPolicy::parse_lenient),
				deleted,
			},
		)
		.await?;

	// Tombstoned services are eventually stopped by the supervisor
	if deleted.is_some() {
		app.store.enqueue_command(&id, CommandAction::Stop).await?;
	}
	Ok(Json(service))
}

#[derive(Debug, Deserialize)]
pub struct CreateCommandRequest {
	pub service_id: String,
	pub action: String,
}

/// Commands always enter the queue as `pending` with a clean slate.
pub async fn create_command(
	_auth: Auth,
	State(app): State<App>,
	Json(body): Json<CreateCommandRequest>,
) -> SwResult<Json<ServiceCommand>> {
	let action = CommandAction::parse(&body.action)?;
	app.store.find_service(&body.service_id).await?;
	Ok(Json(app.store.enqueue_command(&body.service_id, action).await?))
}

pub async fn logs(
	auth: Auth,
	state: State<App>,
	Path(service_id): Path<String>,
) -> SwResult<Json<Vec<ServiceLog>>> {
	logs_limited(auth, state, Path((service_id, 100))).await
}

pub async fn logs_limited(
	_auth: Auth,
	State(app): State<App>,
	Path((service_id, limit)): Path<(String, i64)>,
) -> SwResult<Json<Vec<ServiceLog>>> {
	Ok(Json(app.logs.logs_by_service(&service_id, limit).await?))
}

/// Runs the upstream binary's `superuser upsert` against the service's data
/// directory and returns the generated credentials.
pub async fn upsert_superuser(
	auth: Auth,
	State(app): State<App>,
	Path(service_id): Path<String>,
) -> SwResult<Json<serde_json::Value>> {
	let password: String =
		rand::rng().sample_iter(&Alphanumeric).take(15).map(char::from).collect();

	app.supervisor.upsert_superuser(&service_id, &auth.email, &password).await?;

	Ok(Json(json!({
		"email": auth.email.as_ref(),
		"password": password,
	})))
}

// vim: ts=4
