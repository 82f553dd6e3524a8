//! TLS termination: per-handshake certificate selection from the
//! certificate store, plus the two listener entry points.

use axum::Router;
use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use std::net::SocketAddr;
use std::sync::Arc;

use slipway_certs::store::CertificateStore;
use slipway_core::domainutil;

use crate::prelude::*;

/// Builds a CertifiedKey from PEM-encoded certificate and private key.
fn build_certified_key(cert_pem: &str, key_pem: &str) -> Option<CertifiedKey> {
	let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(cert_pem.as_bytes())
		.filter_map(Result::ok)
		.collect();
	let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes()).ok()?;
	let provider = CryptoProvider::get_default()?;
	CertifiedKey::from_der(certs, key, provider).ok()
}

/// Resolves the serving certificate from the store on every handshake.
/// Names under the apex zone use the wildcard certificate; anything else
/// resolves by its own name.
pub struct CertResolver {
	store: Arc<dyn CertificateStore>,
	apex_domain: Box<str>,
}

impl CertResolver {
	pub fn new(store: Arc<dyn CertificateStore>, apex_domain: &str) -> Arc<Self> {
		Arc::new(Self { store, apex_domain: apex_domain.into() })
	}

	fn domain_for(&self, server_name: &str) -> String {
		let apex = self.apex_domain.as_ref();
		if server_name == apex || server_name.ends_with(&format!(".{}", apex)) {
			domainutil::to_wildcard(apex)
		} else {
			server_name.to_string()
		}
	}
}

impl std::fmt::Debug for CertResolver {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("CertResolver").field("apex_domain", &self.apex_domain).finish()
	}
}

impl ResolvesServerCert for CertResolver {
	fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
		let server_name = client_hello.server_name()?.to_string();
		let domain = self.domain_for(&server_name);

		match self.store.resolve(&domain) {
			Ok(cert) => build_certified_key(&cert.cert_pem, &cert.key_pem).map(Arc::new),
			Err(err) => {
				error!("failed to resolve certificate for {}: {}", domain, err);
				None
			}
		}
	}
}

/// Plain HTTP listener.
pub async fn serve_http(router: Router, addr: SocketAddr) -> SwResult<()> {
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("proxy listening on http://{}", addr);
	axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
		.await
		.map_err(Error::Io)
}

/// TLS listener with per-SNI certificate selection.
pub async fn serve_https(
	router: Router,
	addr: SocketAddr,
	resolver: Arc<CertResolver>,
) -> SwResult<()> {
	let mut config = rustls::ServerConfig::builder()
		.with_no_client_auth()
		.with_cert_resolver(resolver);
	config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

	let tls_config = axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(config));
	info!("proxy listening on https://{}", addr);
	axum_server::bind_rustls(addr, tls_config)
		.serve(router.into_make_service_with_connect_info::<SocketAddr>())
		.await
		.map_err(Error::Io)
}

#[cfg(test)]
mod tests {
	use super::*;
	use slipway_certs::providers::selfsigned::SelfSignedProvider;
	use slipway_certs::providers::CertificateProvider;
	use slipway_certs::store::TlsStore;

	#[test]
	fn apex_zone_names_map_to_the_wildcard() {
		let dir = tempfile::tempdir().unwrap();
		let store: Arc<dyn CertificateStore> = Arc::new(TlsStore::new(dir.path()));
		let resolver = CertResolver::new(store, "pb.labenv.test");

		assert_eq!(resolver.domain_for("pb.labenv.test"), "*.pb.labenv.test");
		assert_eq!(resolver.domain_for("svc1.pb.labenv.test"), "*.pb.labenv.test");
		assert_eq!(resolver.domain_for("custom.example.org"), "custom.example.org");
	}

	#[tokio::test]
	async fn certified_key_builds_from_stored_pem() {
		let cert = SelfSignedProvider::new()
			.request_certificate("*.pb.labenv.test")
			.await
			.unwrap();

		if CryptoProvider::get_default().is_none() {
			let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
		}
		let key = build_certified_key(&cert.cert_pem, &cert.key_pem);
		assert!(key.is_some());
	}
}

// vim: ts=4
