//! Self-signed provider. Testing only: generates an ECDSA P-256 key and a
//! one-year certificate covering the domain (and its base when the domain
//! is a wildcard).

use async_trait::async_trait;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::time::Duration;

use slipway_core::domainutil;

use crate::prelude::*;
use crate::providers::CertificateProvider;
use crate::store::Certificate;

pub struct SelfSignedProvider;

impl SelfSignedProvider {
	pub fn new() -> Self {
		Self
	}
}

impl Default for SelfSignedProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl CertificateProvider for SelfSignedProvider {
	async fn request_certificate(&self, domain: &str) -> SwResult<Certificate> {
		let mut dns_names = vec![domain.to_string()];
		if domainutil::is_wildcard(domain) {
			dns_names.push(domainutil::base_domain(domain).to_string());
		}

		let mut params = CertificateParams::new(dns_names)
			.map_err(|e| Error::ChallengeFailed(format!("certificate params: {}", e)))?;
		let mut dn = DistinguishedName::new();
		dn.push(DnType::CommonName, domain);
		params.distinguished_name = dn;
		params.not_before = time::OffsetDateTime::now_utc();
		params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(365);

		let key_pair = KeyPair::generate()
			.map_err(|e| Error::ChallengeFailed(format!("key generation: {}", e)))?;
		let cert = params
			.self_signed(&key_pair)
			.map_err(|e| Error::ChallengeFailed(format!("self signing: {}", e)))?;

		Ok(Certificate {
			cert_pem: cert.pem().into_boxed_str(),
			key_pem: key_pair.serialize_pem().into_boxed_str(),
			ttl: Duration::ZERO,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::validate;

	#[tokio::test]
	async fn generates_a_valid_one_year_cert() {
		let provider = SelfSignedProvider::new();
		let mut cert = provider.request_certificate("self.test").await.unwrap();
		validate(&mut cert).unwrap();
		assert!(cert.ttl > Duration::from_secs(360 * 24 * 3600));
	}

	#[tokio::test]
	async fn wildcard_cert_covers_base_domain() {
		let provider = SelfSignedProvider::new();
		let cert = provider.request_certificate("*.self.test").await.unwrap();

		let block = pem::parse(cert.cert_pem.as_bytes()).unwrap();
		let (_, parsed) = x509_parser::parse_x509_certificate(block.contents()).unwrap();
		let san = parsed
			.subject_alternative_name()
			.unwrap()
			.map(|ext| format!("{:?}", ext.value))
			.unwrap_or_default();
		assert!(san.contains("*.self.test"));
		assert!(san.contains("self.test"));
	}
}

// vim: ts=4
