//! Slipway: a multi-tenant application launcher and ingress gateway.
//!
//! Downloads released binaries of the upstream application, supervises
//! arbitrarily many instances of them as child processes, and exposes each
//! instance through a dynamic TLS-terminating reverse proxy on the apex
//! domain and its wildcard subdomains. A small embedded management API
//! manages instances, domains and commands.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod prelude;
pub mod routes;

use slipway_certs::manager::CertRequestPlanner;
use slipway_certs::publisher::ChallengeAddressPublisher;
use slipway_certs::store::CertificateStore;
use slipway_runner::logstore::ServiceLogStore;
use slipway_runner::supervisor::ServiceSupervisor;
use slipway_types::store::StoreAdapter;

pub use bootstrap::run;
pub use config::Configs;

/// Shared state of the management API handlers.
pub struct AppState {
	pub config: Configs,
	pub store: Arc<dyn StoreAdapter>,
	pub logs: Arc<ServiceLogStore>,
	pub supervisor: Arc<ServiceSupervisor>,
	pub certs: Arc<dyn CertificateStore>,
	pub planner: Arc<CertRequestPlanner>,
	pub publisher: Arc<ChallengeAddressPublisher>,
	pub jwt_secret: Box<[u8]>,
}

pub type App = Arc<AppState>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// vim: ts=4
