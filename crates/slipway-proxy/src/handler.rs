//! The dynamic reverse proxy handler: host resolution, HTTP→HTTPS
//! redirection, ACME challenge routing and forwarding.

use axum::{
	body::Body,
	extract::{ConnectInfo, Request, State},
	http::{uri::Uri, Method, StatusCode},
	response::{IntoResponse, Redirect, Response},
	Router,
};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use slipway_certs::publisher::ChallengeAddressPublisher;
use slipway_core::netutil;
use slipway_types::store::StoreAdapter;

use crate::discovery::{DomainDiscovery, DomainTarget, ProxyEntryDiscovery, ServiceDiscovery};
use crate::prelude::*;

pub const ACME_CHALLENGE_PATH: &str = "/.well-known/acme-challenge/";
const PROXY_TIMEOUT: Duration = Duration::from_secs(15);
const SUPERUSERS_ENDPOINT: &str = "/api/collections/_superusers/records";

type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
	pub apex_domain: Box<str>,
	/// Internal address of the embedded management API
	pub internal_api_address: Box<str>,
	pub use_https: bool,
	pub disable_https_redirect: bool,
	pub https_port: u16,
}

pub struct ProxyState {
	pub services: Arc<ServiceDiscovery>,
	pub domains: Arc<DomainDiscovery>,
	pub proxy_entries: Arc<ProxyEntryDiscovery>,
	pub publisher: Arc<ChallengeAddressPublisher>,
	pub store: Arc<dyn StoreAdapter>,
	pub config: ProxyConfig,
	client: HttpClient,
}

impl ProxyState {
	pub fn new(
		services: Arc<ServiceDiscovery>,
		domains: Arc<DomainDiscovery>,
		proxy_entries: Arc<ProxyEntryDiscovery>,
		publisher: Arc<ChallengeAddressPublisher>,
		store: Arc<dyn StoreAdapter>,
		config: ProxyConfig,
	) -> SwResult<Arc<Self>> {
		// Upstream targets may be plain service endpoints or external HTTPS
		// proxy entries
		let connector = hyper_rustls::HttpsConnectorBuilder::new()
			.with_native_roots()?
			.https_or_http()
			.enable_http1()
			.build();
		Ok(Arc::new(Self {
			services,
			domains,
			proxy_entries,
			publisher,
			store,
			config,
			client: Client::builder(TokioExecutor::new()).build(connector),
		}))
	}
}

/// Extracts the service/proxy-entry id from a `<id>.<apex>` host.
/// `Ok(None)` means the host is outside the apex zone entirely; an empty or
/// dotted prefix is a bad host.
pub fn extract_id(host: &str, apex_domain: &str) -> SwResult<Option<String>> {
	if host == apex_domain {
		return Err(Error::ValidationError("host is the base domain".into()));
	}
	let Some(prefix) = host.strip_suffix(&format!(".{}", apex_domain)) else {
		return Ok(None);
	};
	if prefix.is_empty() {
		return Err(Error::ValidationError("host prefix is empty".into()));
	}
	if prefix.contains('.') {
		return Err(Error::ValidationError("host prefix contains '.'".into()));
	}
	Ok(Some(prefix.to_string()))
}

impl ProxyState {
	/// Computes the upstream base (`scheme://host[:port]`) for a request
	/// host, per the §4.K resolution order.
	async fn resolve_target(&self, host: &str) -> SwResult<String> {
		if host == self.config.apex_domain.as_ref() {
			return Ok(format!("http://{}", self.config.internal_api_address));
		}

		match extract_id(host, &self.config.apex_domain)? {
			Some(id) => {
				match self.services.find_running_service_by_id(&id).await {
					Ok(endpoint) => {
						return Ok(format!("http://{}:{}", endpoint.ip, endpoint.port))
					}
					Err(Error::NotFound) => {}
					Err(err) => return Err(err),
				}
				match self.proxy_entries.find_enabled_proxy_entry_by_id(&id).await {
					Ok(target_url) => Ok(target_url.trim_end_matches('/').to_string()),
					Err(Error::NotFound) => Err(Error::ValidationError(format!(
						"no target found for host {} with id {}",
						host, id
					))),
					Err(err) => Err(err),
				}
			}
			None => match self.domains.find_target_by_domain(host).await {
				Ok(DomainTarget::Service(service_id)) => {
					let endpoint =
						self.services.find_running_service_by_id(&service_id).await.map_err(
							|_| {
								Error::ValidationError(format!(
									"service not found for id {}",
									service_id
								))
							},
						)?;
					Ok(format!("http://{}:{}", endpoint.ip, endpoint.port))
				}
				Ok(DomainTarget::ProxyEntry(proxy_entry_id)) => self
					.proxy_entries
					.find_enabled_proxy_entry_by_id(&proxy_entry_id)
					.await
					.map(|url| url.trim_end_matches('/').to_string())
					.map_err(|_| {
						Error::ValidationError(format!(
							"proxy entry not found for id {}",
							proxy_entry_id
						))
					}),
				Err(_) => {
					Err(Error::ValidationError(format!("no target found for domain {}", host)))
				}
			},
		}
	}

	/// Forwards the request to `target_base`, applying the forwarding
	/// headers and the hard timeout.
	async fn forward(
		&self,
		target_base: &str,
		mut request: Request,
		remote_ip: &str,
		secure: bool,
	) -> Response {
		let path_and_query = request
			.uri()
			.path_and_query()
			.map_or("/", |pq| pq.as_str())
			.to_string();
		let uri: Uri = match format!("{}{}", target_base, path_and_query).parse() {
			Ok(uri) => uri,
			Err(err) => {
				warn!("invalid upstream URL {}: {}", target_base, err);
				return StatusCode::BAD_GATEWAY.into_response();
			}
		};
		let target_host = uri.authority().map(|a| a.as_str().to_string()).unwrap_or_default();

		// Captured before forwarding for the superuser response hook
		let method = request.method().clone();
		let path = request.uri().path().to_string();
		let authorization = request
			.headers()
			.get(axum::http::header::AUTHORIZATION)
			.and_then(|v| v.to_str().ok())
			.map(str::to_string);

		netutil::prepare_forward_headers(request.headers_mut(), &target_host, remote_ip, secure);
		*request.uri_mut() = uri;

		let response = match tokio::time::timeout(PROXY_TIMEOUT, self.client.request(request)).await
		{
			Ok(Ok(response)) => response,
			Ok(Err(err)) => {
				warn!("proxy error: {}", err);
				return (StatusCode::BAD_GATEWAY, "upstream error").into_response();
			}
			Err(_) => {
				warn!("proxy timeout for {}", target_base);
				return (StatusCode::GATEWAY_TIMEOUT, "proxy timeout").into_response();
			}
		};

		// Response hook: a successful superuser creation retires the
		// matching install token
		if method == Method::POST
			&& path.starts_with(SUPERUSERS_ENDPOINT)
			&& response.status() == StatusCode::OK
		{
			if let Some(authorization) = authorization {
				if !authorization.is_empty() {
					let store = self.store.clone();
					tokio::spawn(async move {
						if let Err(err) =
							store.clean_service_install_token(&authorization).await
						{
							warn!("failed to clean install token: {}", err);
						}
					});
				}
			}
		}

		response.map(Body::new)
	}
}

async fn proxy_request(
	State((state, secure)): State<(Arc<ProxyState>, bool)>,
	ConnectInfo(remote): ConnectInfo<SocketAddr>,
	request: Request,
) -> Response {
	let host = request
		.headers()
		.get(axum::http::header::HOST)
		.and_then(|v| v.to_str().ok())
		.or_else(|| request.uri().host())
		.unwrap_or_default();
	let clean_host = host.split(':').next().unwrap_or_default().to_string();
	let remote_ip = remote.ip().to_string();

	let is_acme_challenge = request.uri().path().starts_with(ACME_CHALLENGE_PATH);
	if is_acme_challenge {
		// Never redirected, even when HTTPS is on; the CA talks plain HTTP
		return match state.publisher.resolve_address() {
			Ok(target) => state.forward(&target, request, &remote_ip, secure).await,
			Err(err) => {
				warn!("no ACME challenge address published: {}", err);
				(StatusCode::INTERNAL_SERVER_ERROR, "not found").into_response()
			}
		};
	}

	if state.config.use_https && !state.config.disable_https_redirect && !secure {
		let uri = request
			.uri()
			.path_and_query()
			.map_or("/", |pq| pq.as_str());
		let location =
			netutil::build_host_url("https", &clean_host, state.config.https_port, uri);
		return Redirect::permanent(&location).into_response();
	}

	match state.resolve_target(&clean_host).await {
		Ok(target) => state.forward(&target, request, &remote_ip, secure).await,
		Err(err) => {
			warn!("target resolution failed for host {}: {}", clean_host, err);
			(StatusCode::BAD_REQUEST, err.to_string()).into_response()
		}
	}
}

/// Builds the proxy router for one listener. `secure` marks the TLS
/// listener so redirects and `X-Forwarded-Proto` come out right.
pub fn router(state: Arc<ProxyState>, secure: bool) -> Router {
	Router::new().fallback(proxy_request).with_state((state, secure))
}


// vim: ts=4
