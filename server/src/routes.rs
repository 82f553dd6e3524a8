//! Management API router.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::api;
use crate::App;

pub fn init(app: App) -> Router {
	Router::new()
		// Setup and session
		.route("/x-api/proxy_configs", get(api::setup::proxy_configs))
		.route("/x-api/setup/admin-exists", get(api::setup::admin_exists))
		.route("/x-api/setup/admin", post(api::setup::create_admin))
		.route("/x-api/auth/login", post(api::setup::login))
		// Services and commands
		.route(
			"/x-api/collections/services",
			get(api::services::list).post(api::services::create),
		)
		.route(
			"/x-api/collections/services/{id}",
			get(api::services::get).patch(api::services::update),
		)
		.route("/x-api/collections/commands", post(api::services::create_command))
		.route("/x-api/service/logs/{service_id}", get(api::services::logs))
		.route("/x-api/service/logs/{service_id}/{limit}", get(api::services::logs_limited))
		.route("/x-api/upsert_superuser/{service_id}", get(api::services::upsert_superuser))
		// Domain bindings
		.route(
			"/x-api/collections/domains",
			get(api::domains::list).post(api::domains::create),
		)
		.route("/x-api/collections/domains/{id}", delete(api::domains::delete))
		// Certificate requests
		.route(
			"/x-api/collections/cert_requests",
			get(api::cert_requests::list).post(api::cert_requests::create),
		)
		.route(
			"/x-api/collections/cert_requests/{id}",
			get(api::cert_requests::get)
				.patch(api::cert_requests::update)
				.delete(api::cert_requests::delete),
		)
		// Proxy entries
		.route(
			"/x-api/collections/proxy_entries",
			get(api::proxy_entries::list).post(api::proxy_entries::create),
		)
		// Repositories and releases
		.route(
			"/x-api/collections/repositories",
			get(api::repositories::list).post(api::repositories::create),
		)
		.route(
			"/x-api/collections/repositories/{id}/releases",
			get(api::repositories::releases),
		)
		.with_state(app)
}

// vim: ts=4
