//! Wires the subsystems together and runs the launcher.

use std::net::SocketAddr;
use std::sync::Arc;

use slipway_certs::account::AccountProvider;
use slipway_certs::manager::{CertRequestExecutor, CertRequestPlanner};
use slipway_certs::providers::cloudflare::CloudflareProvider;
use slipway_certs::providers::http01::Http01Provider;
use slipway_certs::providers::mkcert::MkcertProvider;
use slipway_certs::providers::selfsigned::SelfSignedProvider;
use slipway_certs::providers::{CertificateProvider, ProviderKind};
use slipway_certs::publisher::ChallengeAddressPublisher;
use slipway_certs::store::{CachedCertStore, CertificateStore, TlsStore};
use slipway_core::{domainutil, executor::Task, SequentialExecutor};
use slipway_proxy::discovery::{
	register_invalidation_hooks, DomainDiscovery, ProxyEntryDiscovery, ServiceDiscovery,
};
use slipway_proxy::tls::CertResolver;
use slipway_proxy::{ProxyConfig, ProxyState};
use slipway_release::artifact::ArtifactStorage;
use slipway_release::github::GithubReleaseClient;
use slipway_release::ReleaseSync;
use slipway_runner::logstore::ServiceLogStore;
use slipway_runner::supervisor::{ServiceSupervisor, SupervisorConfig};
use slipway_types::store::StoreAdapter;
use store_adapter_sqlite::StoreAdapterSqlite;

use crate::config::Configs;
use crate::prelude::*;
use crate::{routes, AppState};

fn build_apex_provider(
	config: &Configs,
	accounts: &Arc<AccountProvider>,
) -> SwResult<Arc<dyn CertificateProvider>> {
	let provider: Arc<dyn CertificateProvider> =
		match ProviderKind::parse(config.cert_provider())? {
			ProviderKind::SelfSigned => Arc::new(SelfSignedProvider::new()),
			ProviderKind::Mkcert => Arc::new(MkcertProvider::new()),
			ProviderKind::Cloudflare => Arc::new(CloudflareProvider::new(
				accounts.clone(),
				config.cert_prop("auth_token"),
				config.acme_email(),
			)?),
		};
	Ok(provider)
}

/// The apex wildcard certificate renewal loop. Failures are logged and
/// left for the next tick; until a certificate lands, TLS handshakes under
/// the apex simply fail.
fn wildcard_renewal_task(
	config: &Configs,
	certs: Arc<dyn CertificateStore>,
	provider: Arc<dyn CertificateProvider>,
) -> Task {
	let wildcard = domainutil::to_wildcard(config.domain());
	let min_ttl = config.min_certificate_ttl();

	Task::from_fn(
		move |_cancel| {
			let certs = certs.clone();
			let provider = provider.clone();
			let wildcard = wildcard.clone();
			async move {
				match certs.resolve(&wildcard) {
					Ok(cert) if cert.ttl > min_ttl => return,
					Ok(_)
					| Err(Error::CertificateNotFound(_))
					| Err(Error::InvalidPem)
					| Err(Error::CertificateExpired) => {}
					Err(err) => {
						error!("unexpected error resolving certificate for {}: {}", wildcard, err);
						return;
					}
				}

				let cert = match provider.request_certificate(&wildcard).await {
					Ok(cert) => cert,
					Err(err) => {
						error!("failed to request certificate for {}: {}", wildcard, err);
						return;
					}
				};
				if let Err(err) = certs.store(&wildcard, &cert) {
					error!("failed to store certificate for {}: {}", wildcard, err);
					return;
				}
				info!("certificate requested and stored for {}", wildcard);
			}
		},
		config.certificate_check_interval(),
		i32::MAX,
	)
}

pub async fn run(config: Configs) -> SwResult<()> {
	if rustls::crypto::CryptoProvider::get_default().is_none() {
		let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
	}

	for dir in [
		config.data_dir(),
		config.download_dir(),
		config.certificates_dir(),
		config.accounts_dir(),
	] {
		tokio::fs::create_dir_all(&dir).await?;
	}

	// Storage
	let store: Arc<dyn StoreAdapter> =
		Arc::new(StoreAdapterSqlite::new(config.data_dir().join("slipway.db")).await?);
	let certs: Arc<dyn CertificateStore> =
		Arc::new(CachedCertStore::new(TlsStore::new(config.certificates_dir())));

	// Certificates
	let publisher = Arc::new(ChallengeAddressPublisher::new());
	let accounts = Arc::new(AccountProvider::new(config.accounts_dir()));
	let apex_provider = build_apex_provider(&config, &accounts)?;
	let request_provider: Arc<dyn CertificateProvider> = Arc::new(Http01Provider::new(
		accounts.clone(),
		publisher.clone(),
		config.bind_address(),
		config.acme_email(),
	));
	let planner = Arc::new(CertRequestPlanner::new(
		store.clone(),
		certs.clone(),
		config.min_certificate_ttl(),
		config.max_domain_cert_attempts(),
	));
	let cert_executor =
		Arc::new(CertRequestExecutor::new(store.clone(), certs.clone(), request_provider));

	// Supervision
	let logs = ServiceLogStore::new().await?;
	let supervisor = ServiceSupervisor::new(
		store.clone(),
		logs.clone(),
		SupervisorConfig {
			bind_ip: config.bind_address().to_string(),
			data_dir: config.data_dir(),
			download_dir: config.download_dir(),
		},
	);

	// Releases
	let release_sync = Arc::new(ReleaseSync::new(
		store.clone(),
		GithubReleaseClient::new()?,
		ArtifactStorage::new(config.download_dir()),
	));

	// Management API on an ephemeral port of the bind address; the proxy
	// forwards apex traffic to it
	let app: App = Arc::new(AppState {
		config: config.clone(),
		store: store.clone(),
		logs,
		supervisor: supervisor.clone(),
		certs: certs.clone(),
		planner: planner.clone(),
		publisher: publisher.clone(),
		jwt_secret: crate::auth::new_secret(),
	});
	let api_listener = tokio::net::TcpListener::bind((config.bind_address(), 0)).await?;
	let internal_api_address = api_listener.local_addr()?.to_string();
	info!("management API listening on http://{}", internal_api_address);
	let api_router = routes::init(app.clone());
	tokio::spawn(async move {
		if let Err(err) = axum::serve(api_listener, api_router).await {
			error!("management API server error: {}", err);
		}
	});

	// Proxy
	let services = ServiceDiscovery::new(store.clone());
	let domains = DomainDiscovery::new(store.clone());
	let proxy_entries = ProxyEntryDiscovery::new(store.clone());
	register_invalidation_hooks(&store, services.clone(), domains.clone(), proxy_entries.clone());

	let proxy_state = ProxyState::new(
		services,
		domains,
		proxy_entries,
		publisher.clone(),
		store.clone(),
		ProxyConfig {
			apex_domain: config.domain().into(),
			internal_api_address: internal_api_address.into(),
			use_https: config.is_https_enabled(),
			disable_https_redirect: config.is_https_redirect_disabled(),
			https_port: config.https_port(),
		},
	)?;

	let http_addr: SocketAddr =
		format!("{}:{}", config.listen_address(), config.http_port()).parse()?;
	let http_router = slipway_proxy::router(proxy_state.clone(), false);
	tokio::spawn(async move {
		if let Err(err) = slipway_proxy::tls::serve_http(http_router, http_addr).await {
			error!("proxy server error: {}", err);
		}
	});

	if config.is_https_enabled() {
		let https_addr: SocketAddr =
			format!("{}:{}", config.listen_address(), config.https_port()).parse()?;
		let https_router = slipway_proxy::router(proxy_state.clone(), true);
		let resolver = CertResolver::new(certs.clone(), config.domain());
		tokio::spawn(async move {
			if let Err(err) =
				slipway_proxy::tls::serve_https(https_router, https_addr, resolver).await
			{
				error!("HTTPS proxy server error: {}", err);
			}
		});
	}

	// Control plane: one periodic task at a time, highest priority first
	let executor = SequentialExecutor::new();

	if config.is_https_enabled() {
		executor.add(wildcard_renewal_task(&config, certs.clone(), apex_provider))?;
	}

	{
		let release_sync = release_sync.clone();
		executor.add(Task::from_fn(
			move |_cancel| {
				let release_sync = release_sync.clone();
				async move {
					if let Err(err) = release_sync.run().await {
						error!("release sync task failed: {}", err);
					}
				}
			},
			config.release_sync_interval(),
			99_999,
		))?;
	}

	{
		let supervisor = supervisor.clone();
		executor.add(Task::from_fn(
			move |_cancel| {
				let supervisor = supervisor.clone();
				async move {
					if let Err(err) = supervisor.run().await {
						error!("service runner task failed: {}", err);
					}
				}
			},
			config.command_check_interval(),
			9_999,
		))?;
	}

	{
		let cert_executor = cert_executor.clone();
		executor.add(Task::from_fn(
			move |_cancel| {
				let cert_executor = cert_executor.clone();
				async move {
					if let Err(err) = cert_executor.run().await {
						error!("certificate request executor task failed: {}", err);
					}
				}
			},
			config.cert_request_executor_interval(),
			10,
		))?;
	}

	{
		let planner = planner.clone();
		executor.add(Task::from_fn(
			move |_cancel| {
				let planner = planner.clone();
				async move {
					if let Err(err) = planner.run().await {
						error!("certificate request planner task failed: {}", err);
					}
				}
			},
			config.cert_request_planner_interval(),
			0,
		))?;
	}

	executor.start()?;
	info!(
		"slipway running: domain {}, proxy {}:{}{}",
		config.domain(),
		config.listen_address(),
		config.http_port(),
		if config.is_https_enabled() {
			format!(" / {}:{}", config.listen_address(), config.https_port())
		} else {
			String::new()
		}
	);

	tokio::signal::ctrl_c().await?;
	info!("shutting down");
	executor.stop()?;
	supervisor.dispose().await?;
	Ok(())
}

// vim: ts=4
