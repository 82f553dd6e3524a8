//! The store adapter: typed CRUD over the record collections plus
//! row-change subscriptions.
//!
//! The admin API and the control loops share one record store. The trait
//! below is what the rest of the workspace programs against; the concrete
//! implementation lives in an adapter crate (SQLite by default). Row-change
//! callbacks fire after successful writes and drive the proxy discovery
//! cache invalidation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::prelude::*;

// Enums //
//*******//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
	Idle,
	Running,
	Stopped,
	Failure,
}

impl ServiceStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ServiceStatus::Idle => "idle",
			ServiceStatus::Running => "running",
			ServiceStatus::Stopped => "stopped",
			ServiceStatus::Failure => "failure",
		}
	}

	pub fn parse(s: &str) -> SwResult<Self> {
		match s {
			"idle" => Ok(ServiceStatus::Idle),
			"running" => Ok(ServiceStatus::Running),
			"stopped" => Ok(ServiceStatus::Stopped),
			"failure" => Ok(ServiceStatus::Failure),
			_ => Err(Error::ValidationError(format!("unknown service status: {}", s))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
	No,
	OnFailure,
}

impl RestartPolicy {
	pub fn as_str(&self) -> &'static str {
		match self {
			RestartPolicy::No => "no",
			RestartPolicy::OnFailure => "on-failure",
		}
	}

	/// Unknown values fall back to `No`, like the original record hook.
	pub fn parse_lenient(s: &str) -> Self {
		match s {
			"on-failure" => RestartPolicy::OnFailure,
			_ => RestartPolicy::No,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
	Start,
	Stop,
	Restart,
}

impl CommandAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			CommandAction::Start => "start",
			CommandAction::Stop => "stop",
			CommandAction::Restart => "restart",
		}
	}

	pub fn parse(s: &str) -> SwResult<Self> {
		match s {
			"start" => Ok(CommandAction::Start),
			"stop" => Ok(CommandAction::Stop),
			"restart" => Ok(CommandAction::Restart),
			_ => Err(Error::ValidationError(format!("unknown command action: {}", s))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
	Pending,
	Success,
	Error,
}

impl CommandStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			CommandStatus::Pending => "pending",
			CommandStatus::Success => "success",
			CommandStatus::Error => "error",
		}
	}

	pub fn parse(s: &str) -> SwResult<Self> {
		match s {
			"pending" => Ok(CommandStatus::Pending),
			"success" => Ok(CommandStatus::Success),
			"error" => Ok(CommandStatus::Error),
			_ => Err(Error::ValidationError(format!("unknown command status: {}", s))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertRequestStatus {
	Pending,
	Approved,
	Failed,
}

impl CertRequestStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			CertRequestStatus::Pending => "pending",
			CertRequestStatus::Approved => "approved",
			CertRequestStatus::Failed => "failed",
		}
	}

	pub fn parse(s: &str) -> SwResult<Self> {
		match s {
			"pending" => Ok(CertRequestStatus::Pending),
			"approved" => Ok(CertRequestStatus::Approved),
			"failed" => Ok(CertRequestStatus::Failed),
			_ => Err(Error::ValidationError(format!("unknown cert request status: {}", s))),
		}
	}
}

// Row types //
//***********//

/// Upstream release source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
	pub id: Box<str>,
	/// GitHub `owner/name` identifier
	pub repo: Box<str>,
	pub token: Option<Box<str>>,
	/// Regex a release asset file name must match
	pub release_file_pattern: Box<str>,
	/// Regex the extracted executable file name must match
	pub exec_file_pattern: Box<str>,
	/// Number of upstream releases to look at (1..6)
	pub retention: u8,
	pub disabled: bool,
	pub created: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CreateRepository<'a> {
	pub repo: &'a str,
	pub token: Option<&'a str>,
	pub release_file_pattern: &'a str,
	pub exec_file_pattern: &'a str,
	pub retention: u8,
}

/// One observed version of one repository. Never mutated once inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
	pub id: Box<str>,
	pub repository_id: Box<str>,
	pub version: Box<str>,
	pub release_name: Box<str>,
	pub published_at: Timestamp,
	pub asset_id: Box<str>,
	pub asset_file_name: Box<str>,
	pub download_url: Box<str>,
	pub asset_size: i64,
}

#[derive(Debug, Clone)]
pub struct InsertRelease<'a> {
	pub repository_id: &'a str,
	pub version: &'a str,
	pub release_name: &'a str,
	pub published_at: Timestamp,
	pub asset_id: &'a str,
	pub asset_file_name: &'a str,
	pub download_url: &'a str,
	pub asset_size: i64,
}

/// One managed application instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
	pub id: Box<str>,
	pub name: Box<str>,
	pub release_id: Box<str>,
	pub restart_policy: RestartPolicy,
	pub status: ServiceStatus,
	pub ip: Option<Box<str>>,
	pub port: Option<u16>,
	pub error_message: Option<Box<str>>,
	pub last_started: Option<Timestamp>,
	/// Tombstone; a non-empty value marks the service as logically removed
	pub deleted: Option<Timestamp>,
	pub install_token: Option<Box<str>>,
	pub boot_user_email: Option<Box<str>>,
	pub boot_user_password: Option<Box<str>>,
	pub created: Timestamp,
}

impl Service {
	pub fn is_deleted(&self) -> bool {
		self.deleted.is_some()
	}
}

#[derive(Debug, Clone)]
pub struct CreateService<'a> {
	pub name: &'a str,
	pub release_id: &'a str,
	pub restart_policy: RestartPolicy,
	pub boot_user_email: Option<&'a str>,
	pub boot_user_password: Option<&'a str>,
}

/// Partial service update applied by the admin API. Only these three fields
/// are caller-mutable; everything else belongs to the supervisor.
#[derive(Debug, Clone, Default)]
pub struct UpdateService<'a> {
	pub name: Option<&'a str>,
	pub restart_policy: Option<RestartPolicy>,
	pub deleted: Option<Timestamp>,
}

/// Endpoint of a running service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
	pub id: Box<str>,
	pub ip: Box<str>,
	pub port: u16,
}

/// Imperative lifecycle intent, processed in `created` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCommand {
	pub id: Box<str>,
	pub service_id: Box<str>,
	pub action: CommandAction,
	pub status: CommandStatus,
	pub error_message: Option<Box<str>>,
	pub executed: Option<Timestamp>,
	pub created: Timestamp,
}

/// Maps an external hostname to a managed service or a static proxy entry.
/// Exactly one of `service_id`/`proxy_entry_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainBinding {
	pub id: Box<str>,
	pub domain: Box<str>,
	pub service_id: Option<Box<str>>,
	pub proxy_entry_id: Option<Box<str>>,
	pub use_https: bool,
	pub created: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CreateDomainBinding<'a> {
	pub domain: &'a str,
	pub service_id: Option<&'a str>,
	pub proxy_entry_id: Option<&'a str>,
	pub use_https: bool,
}

/// Static upstream URL target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEntry {
	pub id: Box<str>,
	pub name: Box<str>,
	pub target_url: Box<str>,
	pub enabled: bool,
	pub deleted: Option<Timestamp>,
	pub created: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CreateProxyEntry<'a> {
	pub name: &'a str,
	pub target_url: &'a str,
	pub enabled: bool,
}

/// ACME provisioning record; at most one `pending` row per domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertRequest {
	pub id: Box<str>,
	pub domain: Box<str>,
	pub status: CertRequestStatus,
	pub not_before: Option<Timestamp>,
	pub attempt: u32,
	pub message: Option<Box<str>>,
	pub requested: Option<Timestamp>,
	pub created: Timestamp,
}

// Change subscriptions //
//**********************//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
	Repositories,
	Releases,
	Services,
	ServiceCommands,
	Domains,
	ProxyEntries,
	CertRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
	Create,
	Update,
	Delete,
}

/// Row-change event payload. `key` carries the natural lookup key of the
/// row where it differs from the id (the domain name for domain bindings).
#[derive(Debug, Clone)]
pub struct RowChange {
	pub collection: Collection,
	pub kind: ChangeKind,
	pub id: Box<str>,
	pub key: Option<Box<str>>,
}

pub type ChangeCallback = Arc<dyn Fn(&RowChange) + Send + Sync>;

// Adapter trait //
//***************//

#[async_trait]
pub trait StoreAdapter: Debug + Send + Sync {
	// # Repositories
	async fn list_active_repositories(&self) -> SwResult<Vec<Repository>>;
	async fn find_repository(&self, id: &str) -> SwResult<Repository>;
	async fn create_repository(&self, data: CreateRepository<'_>) -> SwResult<Repository>;

	// # Releases
	/// Lists recorded releases of a repository, newest first
	async fn list_releases(&self, repository_id: &str) -> SwResult<Vec<Release>>;
	async fn find_release(&self, id: &str) -> SwResult<Release>;
	async fn insert_release(&self, data: InsertRelease<'_>) -> SwResult<Release>;

	// # Services
	async fn find_service(&self, id: &str) -> SwResult<Service>;
	async fn list_services(&self) -> SwResult<Vec<Service>>;
	/// Services with `status=running` and no tombstone (used by recovery)
	async fn list_running_services(&self) -> SwResult<Vec<Service>>;
	/// Endpoint of a running, non-deleted service
	async fn find_running_service(&self, id: &str) -> SwResult<ServiceEndpoint>;
	async fn create_service(&self, data: CreateService<'_>) -> SwResult<Service>;
	async fn update_service(&self, id: &str, data: UpdateService<'_>) -> SwResult<Service>;

	/// The supervisor is the only caller of the three status transitions.
	async fn mark_service_running(&self, id: &str, ip: &str, port: u16) -> SwResult<()>;
	async fn mark_service_stopped(&self, id: &str) -> SwResult<()>;
	async fn mark_service_failure(&self, id: &str, message: &str) -> SwResult<()>;

	async fn set_service_install_token(&self, id: &str, token: &str) -> SwResult<()>;
	/// Clears the install token on every service it matches
	async fn clean_service_install_token(&self, token: &str) -> SwResult<()>;

	// # Commands
	/// Pending commands in `created` order
	async fn pending_commands(&self) -> SwResult<Vec<ServiceCommand>>;
	async fn enqueue_command(&self, service_id: &str, action: CommandAction) -> SwResult<ServiceCommand>;
	async fn mark_command_success(&self, id: &str) -> SwResult<()>;
	async fn mark_command_error(&self, id: &str, message: &str) -> SwResult<()>;

	// # Domain bindings
	/// Domains of bindings with `use_https=yes`
	async fn list_https_domains(&self) -> SwResult<Vec<Box<str>>>;
	async fn list_domain_bindings(&self) -> SwResult<Vec<DomainBinding>>;
	async fn find_domain_binding(&self, domain: &str) -> SwResult<DomainBinding>;
	async fn create_domain_binding(&self, data: CreateDomainBinding<'_>) -> SwResult<DomainBinding>;
	async fn delete_domain_binding(&self, id: &str) -> SwResult<()>;

	// # Proxy entries
	async fn find_enabled_proxy_entry(&self, id: &str) -> SwResult<ProxyEntry>;
	async fn list_proxy_entries(&self) -> SwResult<Vec<ProxyEntry>>;
	async fn create_proxy_entry(&self, data: CreateProxyEntry<'_>) -> SwResult<ProxyEntry>;

	// # Certificate requests
	async fn list_cert_requests(&self) -> SwResult<Vec<CertRequest>>;
	async fn find_cert_request(&self, id: &str) -> SwResult<CertRequest>;
	/// Pending requests in insertion order
	async fn pending_cert_requests(&self) -> SwResult<Vec<CertRequest>>;
	async fn pending_cert_requests_by_domain(&self, domain: &str) -> SwResult<Vec<CertRequest>>;
	async fn last_cert_request_by_domain(&self, domain: &str) -> SwResult<Option<CertRequest>>;
	async fn create_pending_cert_request(&self, domain: &str, attempt: u32) -> SwResult<CertRequest>;
	async fn mark_cert_request_approved(&self, id: &str) -> SwResult<()>;
	async fn mark_cert_request_failed(&self, id: &str, message: &str) -> SwResult<()>;
	async fn delete_cert_request(&self, id: &str) -> SwResult<()>;
	async fn delete_pending_cert_requests(&self, domain: &str) -> SwResult<()>;

	// # Superusers
	async fn count_superusers(&self) -> SwResult<i64>;
	/// Transactionally creates the superuser and a matching user row
	async fn create_superuser_with_user(&self, email: &str, password: &str) -> SwResult<()>;
	async fn check_superuser_password(&self, email: &str, password: &str) -> SwResult<bool>;

	// # Subscriptions
	/// Registers a row-change callback; fired after successful writes.
	fn subscribe(&self, collection: Collection, kind: ChangeKind, callback: ChangeCallback);
}

// vim: ts=4
