//! Certificate request manager: the planner decides which domains need a
//! certificate and records pending requests; the executor obtains and
//! stores them.
//!
//! The split keeps the "exactly one attempt in flight per domain" invariant
//! in the `pending` row: planning is idempotent and cheap, execution does
//! the external I/O. Both run as sequential executor tasks.

use std::sync::Arc;
use std::time::Duration;

use slipway_types::store::{CertRequest, CertRequestStatus, StoreAdapter};

use crate::prelude::*;
use crate::providers::CertificateProvider;
use crate::store::CertificateStore;

// Planner //
//*********//

pub struct CertRequestPlanner {
	store: Arc<dyn StoreAdapter>,
	certs: Arc<dyn CertificateStore>,
	min_ttl: Duration,
	max_attempts: u32,
}

impl CertRequestPlanner {
	pub fn new(
		store: Arc<dyn StoreAdapter>,
		certs: Arc<dyn CertificateStore>,
		min_ttl: Duration,
		max_attempts: u32,
	) -> Self {
		Self { store, certs, min_ttl, max_attempts }
	}

	/// Domains of bindings with HTTPS enabled.
	pub async fn domains(&self) -> SwResult<Vec<Box<str>>> {
		self.store.list_https_domains().await
	}

	/// Records a pending certificate request for `domain` unless one already
	/// exists, the attempt budget is exhausted, or the stored certificate is
	/// still fresh enough.
	pub async fn post_ssl_domain_request(
		&self,
		domain: &str,
		check_max_attempts: bool,
	) -> SwResult<()> {
		let pending = self.store.pending_cert_requests_by_domain(domain).await?;
		if !pending.is_empty() {
			return Ok(()); // already has a pending request
		}

		let last = self.store.last_cert_request_by_domain(domain).await?;

		if check_max_attempts {
			if let Some(ref last) = last {
				if last.status == CertRequestStatus::Failed && last.attempt >= self.max_attempts {
					return Ok(()); // exceeded max attempts
				}
			}
		}

		match self.certs.resolve(domain) {
			Ok(cert) if cert.ttl > self.min_ttl => return Ok(()), // valid, no renewal needed
			Ok(_)
			| Err(Error::CertificateNotFound(_))
			| Err(Error::InvalidPem)
			| Err(Error::CertificateExpired) => {}
			Err(err) => return Err(err),
		}

		let attempt = last.map_or(1, |last| last.attempt + 1);
		info!("Planning certificate request for {} (attempt {})", domain, attempt);
		self.store.create_pending_cert_request(domain, attempt).await?;
		Ok(())
	}

	/// One planner tick over every HTTPS-enabled domain.
	pub async fn run(&self) -> SwResult<()> {
		let domains = self.domains().await?;
		for domain in domains {
			if let Err(err) = self.post_ssl_domain_request(&domain, true).await {
				error!("failed to plan cert request for {}: {}", domain, err);
			}
		}
		Ok(())
	}
}

// Executor //
//**********//

pub struct CertRequestExecutor {
	store: Arc<dyn StoreAdapter>,
	certs: Arc<dyn CertificateStore>,
	provider: Arc<dyn CertificateProvider>,
}

impl CertRequestExecutor {
	pub fn new(
		store: Arc<dyn StoreAdapter>,
		certs: Arc<dyn CertificateStore>,
		provider: Arc<dyn CertificateProvider>,
	) -> Self {
		Self { store, certs, provider }
	}

	async fn pending_to_execute(&self) -> SwResult<Vec<CertRequest>> {
		let now = Timestamp::now();
		let requests = self.store.pending_cert_requests().await?;
		Ok(requests
			.into_iter()
			.filter(|r| r.not_before.is_none_or(|not_before| not_before <= now))
			.collect())
	}

	async fn process_request(&self, request: &CertRequest) -> SwResult<()> {
		let cert = match self.provider.request_certificate(&request.domain).await {
			Ok(cert) => cert,
			Err(err) => {
				if let Err(mark_err) =
					self.store.mark_cert_request_failed(&request.id, &err.to_string()).await
				{
					warn!(
						"failed to mark certificate request {} as failed: {}",
						request.id, mark_err
					);
				}
				return Err(err);
			}
		};

		if let Err(err) = self.certs.store(&request.domain, &cert) {
			if let Err(mark_err) =
				self.store.mark_cert_request_failed(&request.id, &err.to_string()).await
			{
				warn!(
					"failed to mark certificate request {} as failed: {}",
					request.id, mark_err
				);
			}
			return Err(err);
		}

		if let Err(err) = self.store.mark_cert_request_approved(&request.id).await {
			warn!("failed to mark certificate request {} as approved: {}", request.id, err);
		}

		Ok(())
	}

	/// One executor tick: processes due pending requests in insertion order.
	/// A failed request is marked and not retried within the tick.
	pub async fn run(&self) -> SwResult<()> {
		let requests = self.pending_to_execute().await?;
		for request in requests {
			if let Err(err) = self.process_request(&request).await {
				error!(
					"failed to process certificate request {} for {}: {}",
					request.id, request.domain, err
				);
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::providers::selfsigned::SelfSignedProvider;
	use crate::store::{CachedCertStore, TlsStore};
	use async_trait::async_trait;
	use parking_lot::Mutex;
	use slipway_types::store::*;

	/// Store stub covering only what the cert manager touches.
	#[derive(Debug, Default)]
	struct FakeStore {
		requests: Mutex<Vec<CertRequest>>,
		https_domains: Mutex<Vec<Box<str>>>,
		next_id: Mutex<u32>,
	}

	impl FakeStore {
		fn with_domains(domains: &[&str]) -> Self {
			let store = Self::default();
			*store.https_domains.lock() =
				domains.iter().map(|d| Box::from(*d)).collect();
			store
		}

		fn push_request(&self, domain: &str, status: CertRequestStatus, attempt: u32) {
			let mut next_id = self.next_id.lock();
			*next_id += 1;
			self.requests.lock().push(CertRequest {
				id: format!("req-{}", next_id).into(),
				domain: domain.into(),
				status,
				not_before: None,
				attempt,
				message: None,
				requested: None,
				created: Timestamp::now(),
			});
		}

		fn pending_count(&self, domain: &str) -> usize {
			self.requests
				.lock()
				.iter()
				.filter(|r| r.domain.as_ref() == domain && r.status == CertRequestStatus::Pending)
				.count()
		}
	}

	#[async_trait]
	impl StoreAdapter for FakeStore {
		async fn list_active_repositories(&self) -> SwResult<Vec<Repository>> { Ok(vec![]) }
		async fn find_repository(&self, _id: &str) -> SwResult<Repository> { Err(Error::NotFound) }
		async fn create_repository(&self, _data: CreateRepository<'_>) -> SwResult<Repository> {
			Err(Error::NotFound)
		}
		async fn list_releases(&self, _repository_id: &str) -> SwResult<Vec<Release>> { Ok(vec![]) }
		async fn find_release(&self, _id: &str) -> SwResult<Release> { Err(Error::NotFound) }
		async fn insert_release(&self, _data: InsertRelease<'_>) -> SwResult<Release> {
			Err(Error::NotFound)
		}
		async fn find_service(&self, _id: &str) -> SwResult<Service> { Err(Error::NotFound) }
		async fn list_services(&self) -> SwResult<Vec<Service>> { Ok(vec![]) }
		async fn list_running_services(&self) -> SwResult<Vec<Service>> { Ok(vec![]) }
		async fn find_running_service(&self, _id: &str) -> SwResult<ServiceEndpoint> {
			Err(Error::NotFound)
		}
		async fn create_service(&self, _data: CreateService<'_>) -> SwResult<Service> {
			Err(Error::NotFound)
		}
		async fn update_service(&self, _id: &str, _data: UpdateService<'_>) -> SwResult<Service> {
			Err(Error::NotFound)
		}
		async fn mark_service_running(&self, _id: &str, _ip: &str, _port: u16) -> SwResult<()> {
			Ok(())
		}
		async fn mark_service_stopped(&self, _id: &str) -> SwResult<()> { Ok(()) }
		async fn mark_service_failure(&self, _id: &str, _message: &str) -> SwResult<()> { Ok(()) }
		async fn set_service_install_token(&self, _id: &str, _token: &str) -> SwResult<()> {
			Ok(())
		}
		async fn clean_service_install_token(&self, _token: &str) -> SwResult<()> { Ok(()) }
		async fn pending_commands(&self) -> SwResult<Vec<ServiceCommand>> { Ok(vec![]) }
		async fn enqueue_command(
			&self,
			_service_id: &str,
			_action: CommandAction,
		) -> SwResult<ServiceCommand> {
			Err(Error::NotFound)
		}
		async fn mark_command_success(&self, _id: &str) -> SwResult<()> { Ok(()) }
		async fn mark_command_error(&self, _id: &str, _message: &str) -> SwResult<()> { Ok(()) }
		async fn list_https_domains(&self) -> SwResult<Vec<Box<str>>> {
			Ok(self.https_domains.lock().clone())
		}
		async fn list_domain_bindings(&self) -> SwResult<Vec<DomainBinding>> { Ok(vec![]) }
		async fn find_domain_binding(&self, _domain: &str) -> SwResult<DomainBinding> {
			Err(Error::NotFound)
		}
		async fn create_domain_binding(
			&self,
			_data: CreateDomainBinding<'_>,
		) -> SwResult<DomainBinding> {
			Err(Error::NotFound)
		}
		async fn delete_domain_binding(&self, _id: &str) -> SwResult<()> { Ok(()) }
		async fn find_enabled_proxy_entry(&self, _id: &str) -> SwResult<ProxyEntry> {
			Err(Error::NotFound)
		}
		async fn list_proxy_entries(&self) -> SwResult<Vec<ProxyEntry>> { Ok(vec![]) }
		async fn create_proxy_entry(&self, _data: CreateProxyEntry<'_>) -> SwResult<ProxyEntry> {
			Err(Error::NotFound)
		}

		async fn list_cert_requests(&self) -> SwResult<Vec<CertRequest>> {
			Ok(self.requests.lock().clone())
		}
		async fn find_cert_request(&self, id: &str) -> SwResult<CertRequest> {
			self.requests
				.lock()
				.iter()
				.find(|r| r.id.as_ref() == id)
				.cloned()
				.ok_or(Error::NotFound)
		}
		async fn pending_cert_requests(&self) -> SwResult<Vec<CertRequest>> {
			Ok(self
				.requests
				.lock()
				.iter()
				.filter(|r| r.status == CertRequestStatus::Pending)
				.cloned()
				.collect())
		}
		async fn pending_cert_requests_by_domain(
			&self,
			domain: &str,
		) -> SwResult<Vec<CertRequest>> {
			Ok(self
				.requests
				.lock()
				.iter()
				.filter(|r| {
					r.domain.as_ref() == domain && r.status == CertRequestStatus::Pending
				})
				.cloned()
				.collect())
		}
		async fn last_cert_request_by_domain(
			&self,
			domain: &str,
		) -> SwResult<Option<CertRequest>> {
			Ok(self
				.requests
				.lock()
				.iter()
				.filter(|r| r.domain.as_ref() == domain)
				.next_back()
				.cloned())
		}
		async fn create_pending_cert_request(
			&self,
			domain: &str,
			attempt: u32,
		) -> SwResult<CertRequest> {
			self.push_request(domain, CertRequestStatus::Pending, attempt);
			Ok(self
				.requests
				.lock()
				.last()
				.cloned()
				.ok_or(Error::Internal("empty request list".into()))?)
		}
		async fn mark_cert_request_approved(&self, id: &str) -> SwResult<()> {
			let mut requests = self.requests.lock();
			for request in requests.iter_mut() {
				if request.id.as_ref() == id {
					request.status = CertRequestStatus::Approved;
					request.requested = Some(Timestamp::now());
				}
			}
			Ok(())
		}
		async fn mark_cert_request_failed(&self, id: &str, message: &str) -> SwResult<()> {
			let mut requests = self.requests.lock();
			for request in requests.iter_mut() {
				if request.id.as_ref() == id {
					request.status = CertRequestStatus::Failed;
					request.message = Some(message.into());
				}
			}
			Ok(())
		}
		async fn delete_cert_request(&self, id: &str) -> SwResult<()> {
			self.requests.lock().retain(|r| r.id.as_ref() != id);
			Ok(())
		}
		async fn delete_pending_cert_requests(&self, domain: &str) -> SwResult<()> {
			self.requests
				.lock()
				.retain(|r| !(r.domain.as_ref() == domain && r.status == CertRequestStatus::Pending));
			Ok(())
		}

		async fn count_superusers(&self) -> SwResult<i64> { Ok(0) }
		async fn create_superuser_with_user(&self, _email: &str, _password: &str) -> SwResult<()> {
			Ok(())
		}
		async fn check_superuser_password(
			&self,
			_email: &str,
			_password: &str,
		) -> SwResult<bool> {
			Ok(false)
		}

		fn subscribe(
			&self,
			_collection: Collection,
			_kind: ChangeKind,
			_callback: ChangeCallback,
		) {
		}
	}

	const MIN_TTL: Duration = Duration::from_secs(720 * 3600);

	fn planner(store: Arc<FakeStore>, certs: Arc<dyn CertificateStore>) -> CertRequestPlanner {
		CertRequestPlanner::new(store, certs, MIN_TTL, 3)
	}

	fn empty_cert_store() -> (tempfile::TempDir, Arc<dyn CertificateStore>) {
		let dir = tempfile::tempdir().unwrap();
		let store: Arc<dyn CertificateStore> =
			Arc::new(CachedCertStore::new(TlsStore::new(dir.path())));
		(dir, store)
	}

	#[tokio::test]
	async fn planner_creates_request_for_uncovered_domain() {
		let store = Arc::new(FakeStore::with_domains(&["a.test"]));
		let (_dir, certs) = empty_cert_store();

		planner(store.clone(), certs).run().await.unwrap();
		assert_eq!(store.pending_count("a.test"), 1);
	}

	#[tokio::test]
	async fn planner_skips_when_pending_exists() {
		let store = Arc::new(FakeStore::with_domains(&["a.test"]));
		store.push_request("a.test", CertRequestStatus::Pending, 1);
		let (_dir, certs) = empty_cert_store();

		planner(store.clone(), certs).run().await.unwrap();
		assert_eq!(store.pending_count("a.test"), 1);
	}

	#[tokio::test]
	async fn planner_skips_fresh_certificate() {
		let store = Arc::new(FakeStore::with_domains(&["a.test"]));
		let (_dir, certs) = empty_cert_store();
		// A one-year self-signed cert is far above the 720h minimum
		let cert = SelfSignedProvider::new().request_certificate("a.test").await.unwrap();
		certs.store("a.test", &cert).unwrap();

		planner(store.clone(), certs).run().await.unwrap();
		assert_eq!(store.pending_count("a.test"), 0);
	}

	#[tokio::test]
	async fn planner_respects_max_attempts() {
		let store = Arc::new(FakeStore::with_domains(&["a.test"]));
		store.push_request("a.test", CertRequestStatus::Failed, 3);
		let (_dir, certs) = empty_cert_store();

		planner(store.clone(), certs).run().await.unwrap();
		assert_eq!(store.pending_count("a.test"), 0);
	}

	#[tokio::test]
	async fn attempts_increase_across_failures() {
		let store = Arc::new(FakeStore::with_domains(&["a.test"]));
		store.push_request("a.test", CertRequestStatus::Failed, 1);
		let (_dir, certs) = empty_cert_store();

		planner(store.clone(), certs).run().await.unwrap();
		let requests = store.requests.lock().clone();
		assert_eq!(requests.last().unwrap().attempt, 2);
	}

	#[tokio::test]
	async fn explicit_request_is_idempotent() {
		let store = Arc::new(FakeStore::with_domains(&[]));
		let (_dir, certs) = empty_cert_store();
		let planner = planner(store.clone(), certs);

		planner.post_ssl_domain_request("b.test", false).await.unwrap();
		planner.post_ssl_domain_request("b.test", false).await.unwrap();
		assert_eq!(store.pending_count("b.test"), 1);
	}

	#[tokio::test]
	async fn executor_obtains_and_approves() {
		let store = Arc::new(FakeStore::with_domains(&["a.test"]));
		store.push_request("a.test", CertRequestStatus::Pending, 1);
		let (_dir, certs) = empty_cert_store();

		let executor = CertRequestExecutor::new(
			store.clone(),
			certs.clone(),
			Arc::new(SelfSignedProvider::new()),
		);
		executor.run().await.unwrap();

		let requests = store.requests.lock().clone();
		assert_eq!(requests[0].status, CertRequestStatus::Approved);
		assert!(requests[0].requested.is_some());
		assert!(certs.resolve("a.test").is_ok());
	}

	#[tokio::test]
	async fn executor_marks_provider_failure() {
		use crate::store::Certificate;

		struct FailingProvider;
		#[async_trait]
		impl CertificateProvider for FailingProvider {
			async fn request_certificate(&self, _domain: &str) -> SwResult<Certificate> {
				Err(Error::Transient("rate limited".into()))
			}
		}

		let store = Arc::new(FakeStore::with_domains(&["a.test"]));
		store.push_request("a.test", CertRequestStatus::Pending, 1);
		let (_dir, certs) = empty_cert_store();

		let executor =
			CertRequestExecutor::new(store.clone(), certs, Arc::new(FailingProvider));
		executor.run().await.unwrap();

		let requests = store.requests.lock().clone();
		assert_eq!(requests[0].status, CertRequestStatus::Failed);
		assert!(requests[0].message.as_deref().unwrap_or("").contains("rate limited"));
	}

	#[tokio::test]
	async fn executor_honors_not_before() {
		let store = Arc::new(FakeStore::with_domains(&[]));
		store.push_request("a.test", CertRequestStatus::Pending, 1);
		store.requests.lock()[0].not_before = Some(Timestamp::from_now(3600));
		let (_dir, certs) = empty_cert_store();

		let executor = CertRequestExecutor::new(
			store.clone(),
			certs,
			Arc::new(SelfSignedProvider::new()),
		);
		executor.run().await.unwrap();

		// Still pending: the request is not due yet
		assert_eq!(store.pending_count("a.test"), 1);
	}
}

// vim: ts=4
