//! Certificate request management.
//!
//! Creating a request goes through the planner, so the one-pending-per-
//! domain invariant holds no matter how often the endpoint is called.
//! Status updates only apply to pending rows; the attempt counter and the
//! planner's bookkeeping stay untouched.

use axum::{
	extract::{Path, State},
	Json,
};
use serde::Deserialize;

use slipway_types::store::{CertRequest, CertRequestStatus};

use crate::auth::Auth;
use crate::prelude::*;

pub async fn list(_auth: Auth, State(app): State<App>) -> SwResult<Json<Vec<CertRequest>>> {
	Ok(Json(app.store.list_cert_requests().await?))
}

pub async fn get(
	_auth: Auth,
	State(app): State<App>,
	Path(id): Path<String>,
) -> SwResult<Json<CertRequest>> {
	Ok(Json(app.store.find_cert_request(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateCertRequestRequest {
	pub domain: String,
}

/// Plans a certificate request for the domain; the max-attempt cap is not
/// consulted for explicit requests.
pub async fn create(
	_auth: Auth,
	State(app): State<App>,
	Json(body): Json<CreateCertRequestRequest>,
) -> SwResult<Json<Option<CertRequest>>> {
	let domain = body.domain.trim().to_lowercase();
	if domain.is_empty() || !domain.contains('.') {
		return Err(Error::ValidationError(format!("invalid domain: {}", body.domain)));
	}

	app.planner.post_ssl_domain_request(&domain, false).await?;
	Ok(Json(app.store.last_cert_request_by_domain(&domain).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCertRequestRequest {
	pub status: String,
	pub message: Option<String>,
}

/// Resolves a pending request by hand: `approved` or `failed`. Terminal
/// rows are left alone.
pub async fn update(
	_auth: Auth,
	State(app): State<App>,
	Path(id): Path<String>,
	Json(body): Json<UpdateCertRequestRequest>,
) -> SwResult<Json<CertRequest>> {
	let request = app.store.find_cert_request(&id).await?;
	if request.status != CertRequestStatus::Pending {
		return Err(Error::InvalidState(format!(
			"cert request {} is already {}",
			id,
			request.status.as_str()
		)));
	}

	match CertRequestStatus::parse(&body.status)? {
		CertRequestStatus::Approved => {
			app.store.mark_cert_request_approved(&id).await?;
		}
		CertRequestStatus::Failed => {
			app.store
				.mark_cert_request_failed(&id, body.message.as_deref().unwrap_or(""))
				.await?;
		}
		CertRequestStatus::Pending => {
			return Err(Error::ValidationError("status must be approved or failed".into()));
		}
	}
	Ok(Json(app.store.find_cert_request(&id).await?))
}

pub async fn delete(
	_auth: Auth,
	State(app): State<App>,
	Path(id): Path<String>,
) -> SwResult<Json<serde_json::Value>> {
	app.store.delete_cert_request(&id).await?;
	Ok(Json(serde_json::json!({})))
}

// vim: ts=4
