//! Certificate providers, polymorphic over "give me a certificate for this
//! domain".

use async_trait::async_trait;

use crate::prelude::*;
use crate::store::Certificate;

pub mod cloudflare;
pub mod http01;
pub mod mkcert;
pub mod selfsigned;

#[async_trait]
pub trait CertificateProvider: Send + Sync {
	async fn request_certificate(&self, domain: &str) -> SwResult<Certificate>;
}

/// Provider selection as it appears in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
	SelfSigned,
	Mkcert,
	Cloudflare,
}

impl ProviderKind {
	pub fn parse(s: &str) -> SwResult<Self> {
		match s {
			"selfsigned" => Ok(ProviderKind::SelfSigned),
			"mkcert" => Ok(ProviderKind::Mkcert),
			"cloudflare" => Ok(ProviderKind::Cloudflare),
			other => Err(Error::UnsupportedProvider(other.into())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn known_kinds_parse() {
		assert_eq!(ProviderKind::parse("selfsigned").unwrap(), ProviderKind::SelfSigned);
		assert_eq!(ProviderKind::parse("mkcert").unwrap(), ProviderKind::Mkcert);
		assert_eq!(ProviderKind::parse("cloudflare").unwrap(), ProviderKind::Cloudflare);
	}

	#[test]
	fn unknown_kind_is_rejected() {
		assert!(matches!(
			ProviderKind::parse("letsencrypt"),
			Err(Error::UnsupportedProvider(_))
		));
	}
}

// vim: ts=4
