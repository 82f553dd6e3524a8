//! ACME DNS-01 provider backed by the Cloudflare API.
//!
//! The only flow that can issue wildcard certificates: a request for
//! `domain` covers `{base(domain), *.base(domain)}`. TXT records are
//! created at `_acme-challenge.<identifier>` and removed again once the
//! order settles.

use async_trait::async_trait;
use instant_acme::{self as acme};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use slipway_core::domainutil;

use crate::account::AccountProvider;
use crate::prelude::*;
use crate::providers::http01::finalize_order;
use crate::providers::CertificateProvider;
use crate::store::Certificate;

const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4";
const MAX_RETRIES: usize = 5;
const TXT_TTL: u32 = 120;

pub struct CloudflareProvider {
	account_provider: Arc<AccountProvider>,
	client: reqwest::Client,
	api_base: String,
	auth_token: String,
	acme_email: String,
}

impl CloudflareProvider {
	/// Fails at construction when the API token is missing.
	pub fn new(
		account_provider: Arc<AccountProvider>,
		auth_token: Option<&str>,
		acme_email: impl Into<String>,
	) -> SwResult<Self> {
		let auth_token = match auth_token {
			Some(token) if !token.is_empty() => token.to_string(),
			_ => {
				return Err(Error::ConfigError(
					"missing or empty 'auth_token' in cert provider config".into(),
				))
			}
		};

		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.map_err(|e| Error::ConfigError(format!("http client: {}", e)))?;

		Ok(Self {
			account_provider,
			client,
			api_base: CLOUDFLARE_API.to_string(),
			auth_token,
			acme_email: acme_email.into(),
		})
	}

	async fn api<T: serde::de::DeserializeOwned>(
		&self,
		build: impl Fn() -> reqwest::RequestBuilder,
	) -> SwResult<T> {
		let mut last_err = None;
		for attempt in 0..MAX_RETRIES {
			if attempt > 0 {
				tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
			}
			let response = match build().bearer_auth(&self.auth_token).send().await {
				Ok(response) => response,
				Err(err) => {
					last_err = Some(format!("cloudflare request: {}", err));
					continue;
				}
			};
			if response.status().is_server_error() {
				last_err = Some(format!("cloudflare status: {}", response.status()));
				continue;
			}
			if !response.status().is_success() {
				return Err(Error::Transient(format!("cloudflare status: {}", response.status())));
			}
			let envelope: CfEnvelope<T> = response
				.json()
				.await
				.map_err(|e| Error::Transient(format!("cloudflare response: {}", e)))?;
			if !envelope.success {
				return Err(Error::Transient(format!(
					"cloudflare error: {:?}",
					envelope.errors
				)));
			}
			return Ok(envelope.result);
		}
		Err(Error::Transient(last_err.unwrap_or_else(|| "cloudflare request failed".into())))
	}

	async fn zone_id(&self, base_domain: &str) -> SwResult<String> {
		let url = format!("{}/zones", self.api_base);
		let zones: Vec<CfZone> = self
			.api(|| self.client.get(&url).query(&[("name", base_domain)]))
			.await?;
		zones
			.into_iter()
			.next()
			.map(|zone| zone.id)
			.ok_or_else(|| Error::ChallengeFailed(format!("no cloudflare zone for {}", base_domain)))
	}

	async fn create_txt_record(
		&self,
		zone_id: &str,
		name: &str,
		content: &str,
	) -> SwResult<String> {
		let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
		let body = json!({ "type": "TXT", "name": name, "content": content, "ttl": TXT_TTL });
		let record: CfRecord = self.api(|| self.client.post(&url).json(&body)).await?;
		debug!("Created TXT record {} ({})", name, record.id);
		Ok(record.id)
	}

	async fn delete_txt_record(&self, zone_id: &str, record_id: &str) {
		let url = format!("{}/zones/{}/dns_records/{}", self.api_base, zone_id, record_id);
		let result: SwResult<serde_json::Value> = self.api(|| self.client.delete(&url)).await;
		if let Err(err) = result {
			warn!("failed to remove TXT record {}: {}", record_id, err);
		}
	}
}

#[derive(Debug, Deserialize)]
struct CfEnvelope<T> {
	success: bool,
	#[serde(default)]
	errors: Vec<serde_json::Value>,
	result: T,
}

#[derive(Debug, Deserialize)]
struct CfZone {
	id: String,
}

#[derive(Debug, Deserialize)]
struct CfRecord {
	id: String,
}

#[async_trait]
impl CertificateProvider for CloudflareProvider {
	async fn request_certificate(&self, domain: &str) -> SwResult<Certificate> {
		let base = domainutil::base_domain(domain).to_string();
		let wildcard = domainutil::to_wildcard(&base);
		let zone_id = self.zone_id(&base).await?;

		let account = self.account_provider.account(&self.acme_email).await?;

		let identifiers = [
			acme::Identifier::Dns(base.clone()),
			acme::Identifier::Dns(wildcard.clone()),
		];
		let mut order = account
			.new_order(&acme::NewOrder::new(&identifiers))
			.await
			.map_err(|e| Error::ChallengeFailed(format!("new order: {}", e)))?;

		let mut record_ids = Vec::new();
		if order.state().status == acme::OrderStatus::Pending {
			let mut authorizations = order.authorizations();
			while let Some(result) = authorizations.next().await {
				let mut authz =
					result.map_err(|e| Error::ChallengeFailed(format!("authorization: {}", e)))?;
				match authz.status {
					acme::AuthorizationStatus::Pending => {}
					acme::AuthorizationStatus::Valid => continue,
					status => {
						warn!("Unexpected ACME authorization status: {:?}", status);
						continue;
					}
				}

				let mut challenge = authz
					.challenge(acme::ChallengeType::Dns01)
					.ok_or(Error::ChallengeFailed("no DNS-01 challenge offered".into()))?;
				let identifier = challenge.identifier().to_string();
				let record_name = format!("_acme-challenge.{}", identifier);
				let dns_value = challenge.key_authorization().dns_value();

				let record_id =
					self.create_txt_record(&zone_id, &record_name, &dns_value).await?;
				record_ids.push(record_id);

				challenge
					.set_ready()
					.await
					.map_err(|e| Error::ChallengeFailed(format!("set ready: {}", e)))?;
			}
		}

		let result = finalize_order(order, &base).await;

		for record_id in &record_ids {
			self.delete_txt_record(&zone_id, record_id).await;
		}

		result
	}
}

// vim: ts=4
