//! mkcert provider for local development. Shells out to the external
//! `mkcert` binary writing into a temp directory.

use async_trait::async_trait;
use std::time::Duration;

use slipway_core::domainutil;

use crate::prelude::*;
use crate::providers::CertificateProvider;
use crate::store::Certificate;

pub struct MkcertProvider;

impl MkcertProvider {
	pub fn new() -> Self {
		Self
	}
}

impl Default for MkcertProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl CertificateProvider for MkcertProvider {
	async fn request_certificate(&self, domain: &str) -> SwResult<Certificate> {
		let tmp_dir = tempfile::Builder::new().prefix("mkcert").tempdir()?;

		let mut args: Vec<&str> = vec![domain];
		let base = domainutil::base_domain(domain);
		if domainutil::is_wildcard(domain) {
			args.push(base);
		}
		args.extend(["-cert-file", "cert.pem", "-key-file", "key.pem"]);

		let status = tokio::process::Command::new("mkcert")
			.args(&args)
			.current_dir(tmp_dir.path())
			.status()
			.await
			.map_err(|e| Error::ChallengeFailed(format!("mkcert spawn: {}", e)))?;
		if !status.success() {
			return Err(Error::ChallengeFailed(format!("mkcert exited with {}", status)));
		}

		let cert_pem = tokio::fs::read_to_string(tmp_dir.path().join("cert.pem")).await?;
		let key_pem = tokio::fs::read_to_string(tmp_dir.path().join("key.pem")).await?;

		Ok(Certificate {
			cert_pem: cert_pem.into_boxed_str(),
			key_pem: key_pem.into_boxed_str(),
			ttl: Duration::ZERO,
		})
	}
}

// vim: ts=4
