//! ACME HTTP-01 provider.
//!
//! Stands up a challenge server on a free port of the bind address and
//! publishes that address so the reverse proxy can route the CA's
//! validation requests to it. Single non-wildcard domains only; wildcards
//! need DNS-01.

use async_trait::async_trait;
use instant_acme::{self as acme};
use std::sync::Arc;
use std::time::Duration;

use slipway_core::domainutil;

use crate::account::AccountProvider;
use crate::http01::ChallengeServer;
use crate::prelude::*;
use crate::providers::CertificateProvider;
use crate::publisher::ChallengeAddressPublisher;
use crate::store::Certificate;

pub struct Http01Provider {
	account_provider: Arc<AccountProvider>,
	publisher: Arc<ChallengeAddressPublisher>,
	bind_ip: String,
	acme_email: String,
}

impl Http01Provider {
	pub fn new(
		account_provider: Arc<AccountProvider>,
		publisher: Arc<ChallengeAddressPublisher>,
		bind_ip: impl Into<String>,
		acme_email: impl Into<String>,
	) -> Self {
		Self {
			account_provider,
			publisher,
			bind_ip: bind_ip.into(),
			acme_email: acme_email.into(),
		}
	}
}

#[async_trait]
impl CertificateProvider for Http01Provider {
	async fn request_certificate(&self, domain: &str) -> SwResult<Certificate> {
		if domainutil::is_wildcard(domain) {
			return Err(Error::ValidationError(
				"wildcard domains are not supported with HTTP-01 challenge".into(),
			));
		}

		let account = self.account_provider.account(&self.acme_email).await?;

		let server = ChallengeServer::bind(&self.bind_ip).await?;
		self.publisher.publish(server.ip(), server.port())?;

		let identifiers = [acme::Identifier::Dns(domain.to_string())];
		let mut order = account
			.new_order(&acme::NewOrder::new(&identifiers))
			.await
			.map_err(|e| Error::ChallengeFailed(format!("new order: {}", e)))?;

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
					.challenge(acme::ChallengeType::Http01)
					.ok_or(Error::ChallengeFailed("no HTTP-01 challenge offered".into()))?;
				let key_authorization = challenge.key_authorization();
				server.insert(&challenge.token, key_authorization.as_str());
				debug!("ACME HTTP-01 challenge published for {}", domain);

				challenge
					.set_ready()
					.await
					.map_err(|e| Error::ChallengeFailed(format!("set ready: {}", e)))?;
			}
		}

		finalize_order(order, domain).await
	}
}

/// Polls the order until it is ready, finalizes it and downloads the chain.
/// Shared with the DNS-01 flow.
pub(crate) async fn finalize_order(
	mut order: acme::Order,
	domain: &str,
) -> SwResult<Certificate> {
	// Give the CA plenty of time to validate; it may need several probes.
	let retry_policy = acme::RetryPolicy::new()
		.initial_delay(Duration::from_secs(1))
		.backoff(1.5)
		.timeout(Duration::from_secs(120));

	let status = order
		.poll_ready(&retry_policy)
		.await
		.map_err(|e| Error::ChallengeFailed(format!("order poll: {}", e)))?;

	if status != acme::OrderStatus::Ready {
		// Surface the per-authorization validation errors before failing
		let mut authorizations = order.authorizations();
		while let Some(Ok(authz)) = authorizations.next().await {
			for challenge in &authz.challenges {
				if let Some(ref err) = challenge.error {
					warn!(
						"ACME validation failed for {}: {}",
						authz.identifier(),
						err.detail.as_deref().unwrap_or("unknown error")
					);
				}
			}
		}
		return Err(Error::ChallengeFailed(format!("order for {} not ready", domain)));
	}

	let key_pem = order
		.finalize()
		.await
		.map_err(|e| Error::ChallengeFailed(format!("finalize: {}", e)))?;
	let retry_policy = acme::RetryPolicy::new()
		.initial_delay(Duration::from_secs(1))
		.backoff(1.5)
		.timeout(Duration::from_secs(120));
	let cert_pem = order
		.poll_certificate(&retry_policy)
		.await
		.map_err(|e| Error::ChallengeFailed(format!("certificate poll: {}", e)))?;

	info!("Obtained ACME certificate for {}", domain);
	Ok(Certificate {
		cert_pem: cert_pem.into_boxed_str(),
		key_pem: key_pem.into_boxed_str(),
		ttl: Duration::ZERO,
	})
}

// vim: ts=4
