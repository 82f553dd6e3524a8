//! SQLite implementation of the Slipway store adapter.
//!
//! One read/write pool with a single connection (SQLite likes one writer)
//! plus a read-only pool for the hot lookup paths. Row-change callbacks
//! fire after successful writes, from the writing call.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::sqlite::{self, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use slipway_types::prelude::*;
use slipway_types::store::*;

mod cert_request;
mod command;
mod domain;
mod proxy_entry;
mod release;
mod repository;
mod schema;
mod service;
mod superuser;
mod utils;

use utils::inspect;

#[derive(Default)]
struct Subscriptions {
	callbacks: RwLock<HashMap<(Collection, ChangeKind), Vec<ChangeCallback>>>,
}

impl Subscriptions {
	fn add(&self, collection: Collection, kind: ChangeKind, callback: ChangeCallback) {
		self.callbacks.write().entry((collection, kind)).or_default().push(callback);
	}

	fn emit(&self, collection: Collection, kind: ChangeKind, id: &str, key: Option<&str>) {
		let callbacks = self.callbacks.read();
		let Some(listeners) = callbacks.get(&(collection, kind)) else {
			return;
		};
		let change =
			RowChange { collection, kind, id: id.into(), key: key.map(Into::into) };
		for listener in listeners {
			listener(&change);
		}
	}
}

pub struct StoreAdapterSqlite {
	db: SqlitePool,
	dbr: SqlitePool,
	subs: Subscriptions,
}

impl std::fmt::Debug for StoreAdapterSqlite {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("StoreAdapterSqlite").finish_non_exhaustive()
	}
}

impl StoreAdapterSqlite {
	pub async fn new(path: impl AsRef<Path>) -> SwResult<Self> {
		let opts = sqlite::SqliteConnectOptions::new()
			.filename(path.as_ref())
			.create_if_missing(true)
			.busy_timeout(std::time::Duration::from_secs(10))
			.journal_mode(sqlite::SqliteJournalMode::Wal);

		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(opts.clone())
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
		let dbr = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts.read_only(true))
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		schema::upgrade(&db).await?;

		Ok(Self { db, dbr, subs: Subscriptions::default() })
	}

	/// Applies pending schema migrations; returns the applied names.
	pub async fn migrate_up(&self) -> SwResult<Vec<Box<str>>> {
		schema::upgrade(&self.db).await
	}

	/// Reverts the latest schema migration, if any.
	pub async fn migrate_down(&self) -> SwResult<Option<Box<str>>> {
		schema::downgrade(&self.db).await
	}
}

#[async_trait]
impl StoreAdapter for StoreAdapterSqlite {
	// Repositories
	//**************
	async fn list_active_repositories(&self) -> SwResult<Vec<Repository>> {
		repository::list_active(&self.dbr).await
	}

	async fn find_repository(&self, id: &str) -> SwResult<Repository> {
		repository::find(&self.dbr, id).await
	}

	async fn create_repository(&self, data: CreateRepository<'_>) -> SwResult<Repository> {
		let repo = repository::create(&self.db, data).await?;
		self.subs.emit(Collection::Repositories, ChangeKind::Create, &repo.id, None);
		Ok(repo)
	}

	// Releases
	//**********
	async fn list_releases(&self, repository_id: &str) -> SwResult<Vec<Release>> {
		release::list(&self.dbr, repository_id).await
	}

	async fn find_release(&self, id: &str) -> SwResult<Release> {
		release::find(&self.dbr, id).await
	}

	async fn insert_release(&self, data: InsertRelease<'_>) -> SwResult<Release> {
		let row = release::insert(&self.db, data).await?;
		self.subs.emit(Collection::Releases, ChangeKind::Create, &row.id, None);
		Ok(row)
	}

	// Services
	//**********
	async fn find_service(&self, id: &str) -> SwResult<Service> {
		service::find(&self.dbr, id).await
	}

	async fn list_services(&self) -> SwResult<Vec<Service>> {
		service::list(&self.dbr).await
	}

	async fn list_running_services(&self) -> SwResult<Vec<Service>> {
		service::list_running(&self.dbr).await
	}

	async fn find_running_service(&self, id: &str) -> SwResult<ServiceEndpoint> {
		service::find_running(&self.dbr, id).await
	}

	async fn create_service(&self, data: CreateService<'_>) -> SwResult<Service> {
		let row = service::create(&self.db, data).await?;
		self.subs.emit(Collection::Services, ChangeKind::Create, &row.id, None);
		Ok(row)
	}

	async fn update_service(&self, id: &str, data: UpdateService<'_>) -> SwResult<Service> {
		let row = service::update(&self.db, id, data).await?;
		self.subs.emit(Collection::Services, ChangeKind::Update, id, None);
		Ok(row)
	}

	async fn mark_service_running(&self, id: &str, ip: &str, port: u16) -> SwResult<()> {
		service::mark_running(&self.db, id, ip, port).await?;
		self.subs.emit(Collection::Services, ChangeKind::Update, id, None);
		Ok(())
	}

	async fn mark_service_stopped(&self, id: &str) -> SwResult<()> {
		service::mark_stopped(&self.db, id).await?;
		self.subs.emit(Collection::Services, ChangeKind::Update, id, None);
		Ok(())
	}

	async fn mark_service_failure(&self, id: &str, message: &str) -> SwResult<()> {
		service::mark_failure(&self.db, id, message).await?;
		self.subs.emit(Collection::Services, ChangeKind::Update, id, None);
		Ok(())
	}

	async fn set_service_install_token(&self, id: &str, token: &str) -> SwResult<()> {
		service::set_install_token(&self.db, id, token).await?;
		self.subs.emit(Collection::Services, ChangeKind::Update, id, None);
		Ok(())
	}

	async fn clean_service_install_token(&self, token: &str) -> SwResult<()> {
		service::clean_install_token(&self.db, token).await
	}

	// Commands
	//**********
	async fn pending_commands(&self) -> SwResult<Vec<ServiceCommand>> {
		command::pending(&self.dbr).await
	}

	async fn enqueue_command(
		&self,
		service_id: &str,
		action: CommandAction,
	) -> SwResult<ServiceCommand> {
		let row = command::enqueue(&self.db, service_id, action).await?;
		self.subs.emit(Collection::ServiceCommands, ChangeKind::Create, &row.id, None);
		Ok(row)
	}

	async fn mark_command_success(&self, id: &str) -> SwResult<()> {
		command::mark_success(&self.db, id).await?;
		self.subs.emit(Collection::ServiceCommands, ChangeKind::Update, id, None);
		Ok(())
	}

	async fn mark_command_error(&self, id: &str, message: &str) -> SwResult<()> {
		command::mark_error(&self.db, id, message).await?;
		self.subs.emit(Collection::ServiceCommands, ChangeKind::Update, id, None);
		Ok(())
	}

	// Domain bindings
	//*****************
	async fn list_https_domains(&self) -> SwResult<Vec<Box<str>>> {
		domain::list_https_domains(&self.dbr).await
	}

	async fn list_domain_bindings(&self) -> SwResult<Vec<DomainBinding>> {
		domain::list(&self.dbr).await
	}

	async fn find_domain_binding(&self, domain: &str) -> SwResult<DomainBinding> {
		domain::find_by_domain(&self.dbr, domain).await
	}

	async fn create_domain_binding(
		&self,
		data: CreateDomainBinding<'_>,
	) -> SwResult<DomainBinding> {
		let row = domain::create(&self.db, data).await?;
		self.subs.emit(
			Collection::Domains,
			ChangeKind::Create,
			&row.id,
			Some(&row.domain),
		);
		Ok(row)
	}

	async fn delete_domain_binding(&self, id: &str) -> SwResult<()> {
		let row = domain::find(&self.dbr, id).await?;
		domain::delete(&self.db, id).await?;
		self.subs.emit(Collection::Domains, ChangeKind::Delete, id, Some(&row.domain));
		Ok(())
	}

	// Proxy entries
	//***************
	async fn find_enabled_proxy_entry(&self, id: &str) -> SwResult<ProxyEntry> {
		proxy_entry::find_enabled(&self.dbr, id).await
	}

	async fn list_proxy_entries(&self) -> SwResult<Vec<ProxyEntry>> {
		proxy_entry::list(&self.dbr).await
	}

	async fn create_proxy_entry(&self, data: CreateProxyEntry<'_>) -> SwResult<ProxyEntry> {
		let row = proxy_entry::create(&self.db, data).await?;
		self.subs.emit(Collection::ProxyEntries, ChangeKind::Create, &row.id, None);
		Ok(row)
	}

	// Certificate requests
	//**********************
	async fn list_cert_requests(&self) -> SwResult<Vec<CertRequest>> {
		cert_request::list(&self.dbr).await
	}

	async fn find_cert_request(&self, id: &str) -> SwResult<CertRequest> {
		cert_request::find(&self.dbr, id).await
	}

	async fn pending_cert_requests(&self) -> SwResult<Vec<CertRequest>> {
		cert_request::pending(&self.dbr).await
	}

	async fn pending_cert_requests_by_domain(&self, domain: &str) -> SwResult<Vec<CertRequest>> {
		cert_request::pending_by_domain(&self.dbr, domain).await
	}

	async fn last_cert_request_by_domain(&self, domain: &str) -> SwResult<Option<CertRequest>> {
		cert_request::last_by_domain(&self.dbr, domain).await
	}

	async fn create_pending_cert_request(
		&self,
		domain: &str,
		attempt: u32,
	) -> SwResult<CertRequest> {
		let row = cert_request::create_pending(&self.db, domain, attempt).await?;
		self.subs.emit(
			Collection::CertRequests,
			ChangeKind::Create,
			&row.id,
			Some(&row.domain),
		);
		Ok(row)
	}

	async fn mark_cert_request_approved(&self, id: &str) -> SwResult<()> {
		cert_request::mark_approved(&self.db, id).await?;
		self.subs.emit(Collection::CertRequests, ChangeKind::Update, id, None);
		Ok(())
	}

	async fn mark_cert_request_failed(&self, id: &str, message: &str) -> SwResult<()> {
		cert_request::mark_failed(&self.db, id, message).await?;
		self.subs.emit(Collection::CertRequests, ChangeKind::Update, id, None);
		Ok(())
	}

	async fn delete_cert_request(&self, id: &str) -> SwResult<()> {
		let row = cert_request::find(&self.dbr, id).await?;
		cert_request::delete(&self.db, id).await?;
		self.subs.emit(Collection::CertRequests, ChangeKind::Delete, id, Some(&row.domain));
		Ok(())
	}

	async fn delete_pending_cert_requests(&self, domain: &str) -> SwResult<()> {
		cert_request::delete_pending(&self.db, domain).await
	}

	// Superusers
	//************
	async fn count_superusers(&self) -> SwResult<i64> {
		superuser::count(&self.dbr).await
	}

	async fn create_superuser_with_user(&self, email: &str, password: &str) -> SwResult<()> {
		superuser::create_with_user(&self.db, email, password).await
	}

	async fn check_superuser_password(&self, email: &str, password: &str) -> SwResult<bool> {
		superuser::check_password(&self.dbr, email, password).await
	}

	// Subscriptions
	//***************
	fn subscribe(&self, collection: Collection, kind: ChangeKind, callback: ChangeCallback) {
		self.subs.add(collection, kind, callback);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn adapter() -> (tempfile::TempDir, StoreAdapterSqlite) {
		let dir = tempfile::tempdir().unwrap();
		let adapter = StoreAdapterSqlite::new(dir.path().join("store.db")).await.unwrap();
		(dir, adapter)
	}

	async fn seed_service(adapter: &StoreAdapterSqlite) -> Service {
		let repo = adapter
			.create_repository(CreateRepository {
				repo: "upstream/appserver",
				token: None,
				release_file_pattern: "linux_amd64.zip",
				exec_file_pattern: "^appserver$",
				retention: 3,
			})
			.await
			.unwrap();
		let release = adapter
			.insert_release(InsertRelease {
				repository_id: &repo.id,
				version: "0.26.1",
				release_name: "0.26.1",
				published_at: Timestamp::now(),
				asset_id: "1",
				asset_file_name: "appserver_linux_amd64.zip",
				download_url: "https://example.test/a.zip",
				asset_size: 1,
			})
			.await
			.unwrap();
		adapter
			.create_service(CreateService {
				name: "first",
				release_id: &release.id,
				restart_policy: RestartPolicy::OnFailure,
				boot_user_email: None,
				boot_user_password: None,
			})
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn service_lifecycle_roundtrip() {
		let (_dir, adapter) = adapter().await;
		let service = seed_service(&adapter).await;
		assert_eq!(service.status, ServiceStatus::Idle);

		adapter.mark_service_running(&service.id, "127.0.0.1", 4321).await.unwrap();
		let endpoint = adapter.find_running_service(&service.id).await.unwrap();
		assert_eq!(endpoint.ip.as_ref(), "127.0.0.1");
		assert_eq!(endpoint.port, 4321);

		adapter.mark_service_stopped(&service.id).await.unwrap();
		assert!(matches!(
			adapter.find_running_service(&service.id).await,
			Err(Error::NotFound)
		));
	}

	#[tokio::test]
	async fn duplicate_release_version_is_rejected() {
		let (_dir, adapter) = adapter().await;
		let service = seed_service(&adapter).await;
		let release = adapter.find_release(&service.release_id).await.unwrap();

		let dup = adapter
			.insert_release(InsertRelease {
				repository_id: &release.repository_id,
				version: "0.26.1",
				release_name: "again",
				published_at: Timestamp::now(),
				asset_id: "2",
				asset_file_name: "x.zip",
				download_url: "",
				asset_size: 1,
			})
			.await;
		assert!(matches!(dup, Err(Error::AlreadyExists(_))));
	}

	#[tokio::test]
	async fn commands_come_back_in_created_order() {
		let (_dir, adapter) = adapter().await;
		let service = seed_service(&adapter).await;

		adapter.enqueue_command(&service.id, CommandAction::Start).await.unwrap();
		adapter.enqueue_command(&service.id, CommandAction::Stop).await.unwrap();
		adapter.enqueue_command(&service.id, CommandAction::Restart).await.unwrap();

		let pending = adapter.pending_commands().await.unwrap();
		let actions: Vec<CommandAction> = pending.iter().map(|c| c.action).collect();
		assert_eq!(
			actions,
			vec![CommandAction::Start, CommandAction::Stop, CommandAction::Restart]
		);

		adapter.mark_command_success(&pending[0].id).await.unwrap();
		assert_eq!(adapter.pending_commands().await.unwrap().len(), 2);
	}

	#[tokio::test]
	async fn domain_binding_targets_are_exclusive() {
		let (_dir, adapter) = adapter().await;
		let service = seed_service(&adapter).await;

		let both = adapter
			.create_domain_binding(CreateDomainBinding {
				domain: "a.test",
				service_id: Some(&service.id),
				proxy_entry_id: Some("p1"),
				use_https: true,
			})
			.await;
		assert!(both.is_err());

		adapter
			.create_domain_binding(CreateDomainBinding {
				domain: "a.test",
				service_id: Some(&service.id),
				proxy_entry_id: None,
				use_https: true,
			})
			.await
			.unwrap();

		let dup = adapter
			.create_domain_binding(CreateDomainBinding {
				domain: "a.test",
				service_id: Some(&service.id),
				proxy_entry_id: None,
				use_https: false,
			})
			.await;
		assert!(matches!(dup, Err(Error::AlreadyExists(_))));

		assert_eq!(adapter.list_https_domains().await.unwrap(), vec!["a.test".into()]);
	}

	#[tokio::test]
	async fn cert_request_ordering_and_marks() {
		let (_dir, adapter) = adapter().await;

		let first = adapter.create_pending_cert_request("a.test", 1).await.unwrap();
		adapter.create_pending_cert_request("b.test", 1).await.unwrap();

		let pending = adapter.pending_cert_requests().await.unwrap();
		assert_eq!(pending.len(), 2);
		assert_eq!(pending[0].domain.as_ref(), "a.test");

		adapter.mark_cert_request_failed(&first.id, "boom").await.unwrap();
		let last = adapter.last_cert_request_by_domain("a.test").await.unwrap().unwrap();
		assert_eq!(last.status, CertRequestStatus::Failed);
		assert_eq!(last.message.as_deref(), Some("boom"));

		adapter.delete_pending_cert_requests("b.test").await.unwrap();
		assert!(adapter.pending_cert_requests().await.unwrap().is_empty());

		// The failed row survives and is reachable by id
		let all = adapter.list_cert_requests().await.unwrap();
		assert_eq!(all.len(), 1);
		let found = adapter.find_cert_request(&first.id).await.unwrap();
		assert_eq!(found.domain.as_ref(), "a.test");

		adapter.delete_cert_request(&first.id).await.unwrap();
		assert!(matches!(
			adapter.find_cert_request(&first.id).await,
			Err(Error::NotFound)
		));
	}

	#[tokio::test]
	async fn subscriptions_fire_on_writes() {
		use std::sync::atomic::{AtomicUsize, Ordering};

		let (_dir, adapter) = adapter().await;
		let service = seed_service(&adapter).await;

		let hits = Arc::new(AtomicUsize::new(0));
		let counter = hits.clone();
		adapter.subscribe(
			Collection::Services,
			ChangeKind::Update,
			Arc::new(move |change| {
				assert_eq!(change.collection, Collection::Services);
				counter.fetch_add(1, Ordering::SeqCst);
			}),
		);

		adapter.mark_service_running(&service.id, "127.0.0.1", 1000).await.unwrap();
		adapter.mark_service_stopped(&service.id).await.unwrap();
		assert_eq!(hits.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn superuser_bootstrap_is_transactional() {
		let (_dir, adapter) = adapter().await;
		assert_eq!(adapter.count_superusers().await.unwrap(), 0);

		adapter.create_superuser_with_user("admin@a.test", "hunter2").await.unwrap();
		assert_eq!(adapter.count_superusers().await.unwrap(), 1);
		assert!(adapter.check_superuser_password("admin@a.test", "hunter2").await.unwrap());
		assert!(!adapter.check_superuser_password("admin@a.test", "nope").await.unwrap());

		let dup = adapter.create_superuser_with_user("admin@a.test", "x").await;
		assert!(matches!(dup, Err(Error::AlreadyExists(_))));
	}

	#[tokio::test]
	async fn migrations_can_be_reverted() {
		let (_dir, adapter) = adapter().await;

		// Fresh database: everything applied by the constructor
		assert!(adapter.migrate_up().await.unwrap().is_empty());

		let reverted = adapter.migrate_down().await.unwrap();
		assert_eq!(reverted.as_deref(), Some("0004_superusers"));

		let reapplied = adapter.migrate_up().await.unwrap();
		assert_eq!(reapplied, vec!["0004_superusers".into()]);
	}
}

// vim: ts=4
