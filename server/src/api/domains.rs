//! Domain binding management.
//!
//! Listing responses carry response-shaped certificate fields computed from
//! the cert request table and the certificate store; they are never
//! persisted. Creating an HTTPS binding eagerly plans a certificate
//! request; deleting a binding retires its pending requests.

use axum::{
	extract::{Path, State},
	Json,
};
use serde::{Deserialize, Serialize};

use slipway_types::store::{CreateDomainBinding, DomainBinding};

use crate::auth::Auth;
use crate::prelude::*;

#[derive(Debug, Serialize)]
pub struct DomainResponse {
	#[serde(flatten)]
	pub binding: DomainBinding,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cert_request_state: Option<Box<str>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reached_max_attempt: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failed_error_message: Option<Box<str>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub has_valid_ssl_cert: Option<bool>,
}

pub async fn list(_auth: Auth, State(app): State<App>) -> SwResult<Json<Vec<DomainResponse>>> {
	let bindings = app.store.list_domain_bindings().await?;
	let max_attempts = app.config.max_domain_cert_attempts();

	let mut responses = Vec::with_capacity(bindings.len());
	for binding in bindings {
		let mut response = DomainResponse {
			binding,
			cert_request_state: None,
			reached_max_attempt: None,
			failed_error_message: None,
			has_valid_ssl_cert: None,
		};
		if response.binding.use_https {
			if let Some(last) =
				app.store.last_cert_request_by_domain(&response.binding.domain).await?
			{
				response.cert_request_state = Some(last.status.as_str().into());
				response.reached_max_attempt = Some(last.attempt >= max_attempts);
				response.failed_error_message = last.message;
			}
			let valid = app
				.certs
				.resolve(&response.binding.domain)
				.map(|cert| !cert.ttl.is_zero())
				.unwrap_or(false);
			response.has_valid_ssl_cert = Some(valid);
		}
		responses.push(response);
	}
	Ok(Json(responses))
}

#[derive(Debug, Deserialize)]
pub struct CreateDomainRequest {
	pub domain: String,
	pub service_id: Option<String>,
	pub proxy_entry_id: Option<String>,
	#[serde(default)]
	pub use_https: bool,
}

pub async fn create(
	_auth: Auth,
	State(app): State<App>,
	Json(body): Json<CreateDomainRequest>,
) -> SwResult<Json<DomainBinding>> {
	let domain = body.domain.trim().to_lowercase();
	if domain.is_empty() || !domain.contains('.') {
		return Err(Error::ValidationError(format!("invalid domain: {}", body.domain)));
	}

	let binding = app
		.store
		.create_domain_binding(CreateDomainBinding {
			domain: &domain,
			service_id: body.service_id.as_deref(),
			proxy_entry_id: body.proxy_entry_id.as_deref(),
			use_https: body.use_https,
		})
		.await?;

	if binding.use_https {
		// Provision eagerly; the max-attempt cap is not consulted for
		// explicit requests
		app.planner.post_ssl_domain_request(&binding.domain, false).await?;
	}
	Ok(Json(binding))
}

pub async fn delete(
	_auth: Auth,
	State(app): State<App>,
	Path(id): Path<String>,
) -> SwResult<Json<serde_json::Value>> {
	let binding = app
		.store
		.list_domain_bindings()
		.await?
		.into_iter()
		.find(|binding| binding.id.as_ref() == id)
		.ok_or(Error::NotFound)?;

	app.store.delete_domain_binding(&id).await?;
	app.store.delete_pending_cert_requests(&binding.domain).await?;
	Ok(Json(serde_json::json!({})))
}

// vim: ts=4
