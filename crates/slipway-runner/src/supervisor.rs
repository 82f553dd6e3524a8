//! The service supervisor: evaluates the command queue, reacts to process
//! failures, recovers state after a launcher restart.
//!
//! The supervisor exclusively owns the live process handles and is the only
//! writer of service status and endpoint. Crashes are drained from the
//! process error channel on a background worker concurrent with the
//! command ticks.

use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use slipway_core::netutil;
use slipway_release::finder;
use slipway_types::store::{CommandAction, RestartPolicy, StoreAdapter};

use crate::logstore::{ServiceLogStore, StreamType};
use crate::prelude::*;
use crate::process::{InterceptSink, Process, ProcessErrorMessage, ProcessOptions};
use crate::token::{extract_install_token, InstallTokenUsecase};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	pub bind_ip: String,
	pub data_dir: PathBuf,
	pub download_dir: PathBuf,
}

pub struct ServiceSupervisor {
	store: Arc<dyn StoreAdapter>,
	logs: Arc<ServiceLogStore>,
	tokens: Arc<InstallTokenUsecase>,
	config: SupervisorConfig,
	processes: RwLock<HashMap<Box<str>, Arc<Process>>>,
	err_tx: flume::Sender<ProcessErrorMessage>,
	recovered: AtomicBool,
}

impl ServiceSupervisor {
	pub fn new(
		store: Arc<dyn StoreAdapter>,
		logs: Arc<ServiceLogStore>,
		config: SupervisorConfig,
	) -> Arc<Self> {
		let (err_tx, err_rx) = flume::bounded::<ProcessErrorMessage>(64);

		let supervisor = Arc::new(Self {
			tokens: InstallTokenUsecase::new(store.clone()),
			store,
			logs,
			config,
			processes: RwLock::new(HashMap::new()),
			err_tx,
			recovered: AtomicBool::new(false),
		});

		supervisor.spawn_failure_drain(err_rx);
		supervisor
	}

	/// Drains process exit errors: mark the service failed, then re-enqueue
	/// a start command when its restart policy asks for one.
	fn spawn_failure_drain(&self, rx: flume::Receiver<ProcessErrorMessage>) {
		let store = self.store.clone();
		tokio::spawn(async move {
			while let Ok(message) = rx.recv_async().await {
				warn!("service {} failed: {}", message.id, message.error);
				if let Err(err) = store.mark_service_failure(&message.id, &message.error).await {
					error!("failed to mark service {} as failed: {}", message.id, err);
					continue;
				}

				match store.find_service(&message.id).await {
					Ok(service)
						if service.restart_policy == RestartPolicy::OnFailure
							&& !service.is_deleted() =>
					{
						match store.enqueue_command(&message.id, CommandAction::Start).await {
							Ok(_) => info!("scheduled restart for service {}", message.id),
							Err(err) => {
								error!("failed to schedule restart for {}: {}", message.id, err);
							}
						}
					}
					Ok(_) => {}
					Err(err) => error!("failed to re-read service {}: {}", message.id, err),
				}
			}
		});
	}

	/// One supervisor tick: recover once after startup, then evaluate the
	/// pending command queue in `created` order.
	pub async fn run(&self) -> SwResult<()> {
		if !self.recovered.load(Ordering::SeqCst) {
			self.recover_last_state().await?;
			self.recovered.store(true, Ordering::SeqCst);
		}
		self.evaluate_commands().await
	}

	async fn evaluate_commands(&self) -> SwResult<()> {
		let commands = self.store.pending_commands().await?;
		for command in commands {
			debug!("executing command {:?} for service {}", command.action, command.service_id);
			let result = match command.action {
				CommandAction::Start => self.start_service(&command.service_id).await,
				CommandAction::Stop => self.stop_service(&command.service_id).await,
				CommandAction::Restart => self.restart_service(&command.service_id).await,
			};

			let mark = match result {
				Ok(()) => self.store.mark_command_success(&command.id).await,
				Err(err) => self.store.mark_command_error(&command.id, &err.to_string()).await,
			};
			if let Err(err) = mark {
				error!("failed to mark command {}: {}", command.id, err);
			}
		}
		Ok(())
	}

	/// Starts a new process for the service, assigning a fresh endpoint.
	/// Any start-path error marks the service as failed.
	pub async fn start_service(&self, service_id: &str) -> SwResult<()> {
		let result = self.try_start(service_id).await;
		if let Err(ref err) = result {
			if !matches!(err, Error::AlreadyRunning(_)) {
				if let Err(mark_err) =
					self.store.mark_service_failure(service_id, &err.to_string()).await
				{
					error!("failed to mark service {} as failed: {}", service_id, mark_err);
				}
			}
		}
		result
	}

	async fn try_start(&self, service_id: &str) -> SwResult<()> {
		if let Some(handle) = self.processes.read().get(service_id) {
			if handle.is_running() {
				return Err(Error::AlreadyRunning(service_id.into()));
			}
		}

		let service = self.store.find_service(service_id).await?;
		let release = self.store.find_release(&service.release_id).await?;
		let repo = self.store.find_repository(&release.repository_id).await?;

		let pattern = Regex::new(&repo.exec_file_pattern)
			.map_err(|e| Error::ValidationError(format!("exec_file_pattern: {}", e)))?;
		let binary =
			finder::find_binary(&self.config.download_dir, &repo.id, &release.version, &pattern)?;

		let (ip, port) = netutil::get_available_port(&self.config.bind_ip).await?;
		let args = self.build_args(service_id, &ip, port).await?;

		let stdout_sink = {
			let tokens = self.tokens.clone();
			let id: Box<str> = service_id.into();
			Arc::new(InterceptSink::new(
				self.logs.writer(service_id, StreamType::Stdout),
				Box::new(move |data| {
					if let Some(token) = extract_install_token(data) {
						let tokens = tokens.clone();
						let id = id.clone();
						tokio::spawn(async move {
							if let Err(err) = tokens.set_install_token(&id, &token).await {
								warn!("failed to store install token for {}: {}", id, err);
							}
						});
					}
				}),
			))
		};

		let process = Process::new(
			service_id,
			binary.to_string_lossy().into_owned(),
			args,
			ProcessOptions {
				error_chan: Some(self.err_tx.clone()),
				stdout: Some(stdout_sink),
				stderr: Some(self.logs.writer(service_id, StreamType::Stderr)),
			},
		);
		process.start().await?;

		self.processes.write().insert(service_id.into(), process);
		self.store.mark_service_running(service_id, &ip, port).await?;
		info!("service {} running on {}:{}", service_id, ip, port);
		Ok(())
	}

	/// Standard argument set of the upstream application.
	async fn build_args(&self, service_id: &str, ip: &str, port: u16) -> SwResult<Vec<Box<str>>> {
		let root = self.config.data_dir.join(service_id);
		let pb_data = root.join("pb_data");
		let hooks = root.join("hooks");
		let public = root.join("public");
		let migrations = root.join("migrations");
		for dir in [&pb_data, &hooks, &public, &migrations] {
			tokio::fs::create_dir_all(dir).await?;
		}

		Ok(vec![
			"serve".into(),
			"--http".into(),
			format!("{}:{}", ip, port).into(),
			"--dir".into(),
			pb_data.to_string_lossy().into_owned().into(),
			"--hooksDir".into(),
			hooks.to_string_lossy().into_owned().into(),
			"--publicDir".into(),
			public.to_string_lossy().into_owned().into(),
			"--migrationsDir".into(),
			migrations.to_string_lossy().into_owned().into(),
		])
	}

	pub async fn stop_service(&self, service_id: &str) -> SwResult<()> {
		let handle = self.processes.read().get(service_id).cloned();
		match handle {
			Some(handle) if handle.is_running() => {
				handle.stop().await?;
				self.processes.write().remove(service_id);
				self.store.mark_service_stopped(service_id).await?;
				info!("service {} stopped", service_id);
				Ok(())
			}
			_ => Err(Error::InvalidState(format!("service {} is not running", service_id))),
		}
	}

	pub async fn restart_service(&self, service_id: &str) -> SwResult<()> {
		let handle = self.processes.read().get(service_id).cloned();
		if let Some(handle) = handle {
			if handle.is_running() {
				handle.stop().await?;
				self.processes.write().remove(service_id);
			}
		}
		self.start_service(service_id).await
	}

	/// Restarts every service recorded as running, re-assigning endpoints.
	/// Runs once per launcher lifetime; failed services stay failed and
	/// recovery continues for the rest.
	async fn recover_last_state(&self) -> SwResult<()> {
		let services = self.store.list_running_services().await?;
		if services.is_empty() {
			return Ok(());
		}
		info!("recovering {} previously running services", services.len());
		for service in services {
			if let Err(err) = self.start_service(&service.id).await {
				error!("failed to recover service {}: {}", service.id, err);
			}
		}
		Ok(())
	}

	/// Runs the upstream binary's `superuser upsert` against the service's
	/// data directory.
	pub async fn upsert_superuser(
		&self,
		service_id: &str,
		email: &str,
		password: &str,
	) -> SwResult<()> {
		let service = self.store.find_service(service_id).await?;
		let release = self.store.find_release(&service.release_id).await?;
		let repo = self.store.find_repository(&release.repository_id).await?;

		let pattern = Regex::new(&repo.exec_file_pattern)
			.map_err(|e| Error::ValidationError(format!("exec_file_pattern: {}", e)))?;
		let binary =
			finder::find_binary(&self.config.download_dir, &repo.id, &release.version, &pattern)?;
		let pb_data = self.config.data_dir.join(service_id).join("pb_data");

		let output = tokio::process::Command::new(&binary)
			.args(["superuser", "upsert", email, password, "--dir"])
			.arg(&pb_data)
			.output()
			.await?;
		if !output.status.success() {
			return Err(Error::Internal(format!(
				"superuser upsert failed: {}",
				String::from_utf8_lossy(&output.stderr)
			)));
		}
		Ok(())
	}

	fn running_handles(&self) -> Vec<(Box<str>, Arc<Process>)> {
		self.processes.write().drain().collect()
	}

	/// Stops every live process concurrently and joins the errors.
	pub async fn dispose(&self) -> SwResult<()> {
		let handles = self.running_handles();
		info!("disposing {} live processes", handles.len());

		let results = futures::future::join_all(handles.into_iter().map(|(id, handle)| async move {
			handle.stop().await.map_err(|err| format!("{}: {}", id, err))
		}))
		.await;

		let errors: Vec<String> = results.into_iter().filter_map(Result::err).collect();
		if errors.is_empty() {
			Ok(())
		} else {
			Err(Error::Internal(errors.join("; ")))
		}
	}

	/// True when the supervisor holds a live handle for the service.
	pub fn is_running(&self, service_id: &str) -> bool {
		self.processes.read().get(service_id).is_some_and(|handle| handle.is_running())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use parking_lot::Mutex;
	use slipway_types::store::*;
	use std::os::unix::fs::PermissionsExt;
	use std::time::Duration;

	#[derive(Debug, Default)]
	struct LeanStore {
		repositories: Mutex<Vec<Repository>>,
		releases: Mutex<Vec<Release>>,
		services: Mutex<Vec<Service>>,
		commands: Mutex<Vec<ServiceCommand>>,
		next_command: Mutex<u32>,
	}

	impl LeanStore {
		fn service(&self, id: &str) -> Service {
			self.services
				.lock()
				.iter()
				.find(|s| s.id.as_ref() == id)
				.cloned()
				.unwrap()
		}

		fn commands_snapshot(&self) -> Vec<ServiceCommand> {
			self.commands.lock().clone()
		}
	}

	#[async_trait]
	impl StoreAdapter for LeanStore {
		async fn list_active_repositories(&self) -> SwResult<Vec<Repository>> {
			Ok(self.repositories.lock().clone())
		}
		async fn find_repository(&self, id: &str) -> SwResult<Repository> {
			self.repositories
				.lock()
				.iter()
				.find(|r| r.id.as_ref() == id)
				.cloned()
				.ok_or(Error::NotFound)
		}
		async fn create_repository(&self, _data: CreateRepository<'_>) -> SwResult<Repository> {
			Err(Error::Internal("unused".into()))
		}
		async fn list_releases(&self, repository_id: &str) -> SwResult<Vec<Release>> {
			Ok(self
				.releases
				.lock()
				.iter()
				.filter(|r| r.repository_id.as_ref() == repository_id)
				.cloned()
				.collect())
		}
		async fn find_release(&self, id: &str) -> SwResult<Release> {
			self.releases
				.lock()
				.iter()
				.find(|r| r.id.as_ref() == id)
				.cloned()
				.ok_or(Error::NotFound)
		}
		async fn insert_release(&self, _data: InsertRelease<'_>) -> SwResult<Release> {
			Err(Error::Internal("unused".into()))
		}
		async fn find_service(&self, id: &str) -> SwResult<Service> {
			self.services
				.lock()
				.iter()
				.find(|s| s.id.as_ref() == id)
				.cloned()
				.ok_or(Error::NotFound)
		}
		async fn list_services(&self) -> SwResult<Vec<Service>> {
			Ok(self.services.lock().clone())
		}
		async fn list_running_services(&self) -> SwResult<Vec<Service>> {
			Ok(self
				.services
				.lock()
				.iter()
				.filter(|s| s.status == ServiceStatus::Running && !s.is_deleted())
				.cloned()
				.collect())
		}
		async fn find_running_service(&self, _id: &str) -> SwResult<ServiceEndpoint> {
			Err(Error::NotFound)
		}
		async fn create_service(&self, _data: CreateService<'_>) -> SwResult<Service> {
			Err(Error::Internal("unused".into()))
		}
		async fn update_service(&self, _id: &str, _data: UpdateService<'_>) -> SwResult<Service> {
			Err(Error::Internal("unused".into()))
		}
		async fn mark_service_running(&self, id: &str, ip: &str, port: u16) -> SwResult<()> {
			for service in self.services.lock().iter_mut() {
				if service.id.as_ref() == id {
					service.status = ServiceStatus::Running;
					service.ip = Some(ip.into());
					service.port = Some(port);
					service.last_started = Some(Timestamp::now());
					service.error_message = None;
				}
			}
			Ok(())
		}
		async fn mark_service_stopped(&self, id: &str) -> SwResult<()> {
			for service in self.services.lock().iter_mut() {
				if service.id.as_ref() == id {
					service.status = ServiceStatus::Stopped;
				}
			}
			Ok(())
		}
		async fn mark_service_failure(&self, id: &str, message: &str) -> SwResult<()> {
			for service in self.services.lock().iter_mut() {
				if service.id.as_ref() == id {
					service.status = ServiceStatus::Failure;
					service.error_message = Some(message.into());
				}
			}
			Ok(())
		}
		async fn set_service_install_token(&self, id: &str, token: &str) -> SwResult<()> {
			for service in self.services.lock().iter_mut() {
				if service.id.as_ref() == id {
					service.install_token = Some(token.into());
				}
			}
			Ok(())
		}
		async fn clean_service_install_token(&self, _token: &str) -> SwResult<()> {
			Ok(())
		}
		async fn pending_commands(&self) -> SwResult<Vec<ServiceCommand>> {
			Ok(self
				.commands
				.lock()
				.iter()
				.filter(|c| c.status == CommandStatus::Pending)
				.cloned()
				.collect())
		}
		async fn enqueue_command(
			&self,
			service_id: &str,
			action: CommandAction,
		) -> SwResult<ServiceCommand> {
			let mut next = self.next_command.lock();
			*next += 1;
			let command = ServiceCommand {
				id: format!("cmd-{}", next).into(),
				service_id: service_id.into(),
				action,
				status: CommandStatus::Pending,
				error_message: None,
				executed: None,
				created: Timestamp::now(),
			};
			self.commands.lock().push(command.clone());
			Ok(command)
		}
		async fn mark_command_success(&self, id: &str) -> SwResult<()> {
			for command in self.commands.lock().iter_mut() {
				if command.id.as_ref() == id {
					command.status = CommandStatus::Success;
					command.executed = Some(Timestamp::now());
				}
			}
			Ok(())
		}
		async fn mark_command_error(&self, id: &str, message: &str) -> SwResult<()> {
			for command in self.commands.lock().iter_mut() {
				if command.id.as_ref() == id {
					command.status = CommandStatus::Error;
					command.error_message = Some(message.into());
					command.executed = Some(Timestamp::now());
				}
			}
			Ok(())
		}
		async fn list_https_domains(&self) -> SwResult<Vec<Box<str>>> {
			Ok(vec![])
		}
		async fn list_domain_bindings(&self) -> SwResult<Vec<DomainBinding>> {
			Ok(vec![])
		}
		async fn find_domain_binding(&self, _domain: &str) -> SwResult<DomainBinding> {
			Err(Error::NotFound)
		}
		async fn create_domain_binding(
			&self,
			_data: CreateDomainBinding<'_>,
		) -> SwResult<DomainBinding> {
			Err(Error::Internal("unused".into()))
		}
		async fn delete_domain_binding(&self, _id: &str) -> SwResult<()> {
			Ok(())
		}
		async fn find_enabled_proxy_entry(&self, _id: &str) -> SwResult<ProxyEntry> {
			Err(Error::NotFound)
		}
		async fn list_proxy_entries(&self) -> SwResult<Vec<ProxyEntry>> {
			Ok(vec![])
		}
		async fn create_proxy_entry(&self, _data: CreateProxyEntry<'_>) -> SwResult<ProxyEntry> {
			Err(Error::Internal("unused".into()))
		}
		async fn list_cert_requests(&self) -> SwResult<Vec<CertRequest>> {
			Ok(vec![])
		}
		async fn find_cert_request(&self, _id: &str) -> SwResult<CertRequest> {
			Err(Error::NotFound)
		}
		async fn pending_cert_requests(&self) -> SwResult<Vec<CertRequest>> {
			Ok(vec![])
		}
		async fn pending_cert_requests_by_domain(
			&self,
			_domain: &str,
		) -> SwResult<Vec<CertRequest>> {
			Ok(vec![])
		}
		async fn last_cert_request_by_domain(
			&self,
			_domain: &str,
		) -> SwResult<Option<CertRequest>> {
			Ok(None)
		}
		async fn create_pending_cert_request(
			&self,
			_domain: &str,
			_attempt: u32,
		) -> SwResult<CertRequest> {
			Err(Error::Internal("unused".into()))
		}
		async fn mark_cert_request_approved(&self, _id: &str) -> SwResult<()> {
			Ok(())
		}
		async fn mark_cert_request_failed(&self, _id: &str, _message: &str) -> SwResult<()> {
			Ok(())
		}
		async fn delete_cert_request(&self, _id: &str) -> SwResult<()> {
			Ok(())
		}
		async fn delete_pending_cert_requests(&self, _domain: &str) -> SwResult<()> {
			Ok(())
		}
		async fn count_superusers(&self) -> SwResult<i64> {
			Ok(0)
		}
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

	struct Fixture {
		store: Arc<LeanStore>,
		supervisor: Arc<ServiceSupervisor>,
		_download_dir: tempfile::TempDir,
		_data_dir: tempfile::TempDir,
	}

	/// One repository + release + service backed by a shell script artifact.
	async fn fixture(script: &str, restart_policy: RestartPolicy) -> Fixture {
		let download_dir = tempfile::tempdir().unwrap();
		let data_dir = tempfile::tempdir().unwrap();

		let version_dir = download_dir.path().join("repo1/0.26.1");
		std::fs::create_dir_all(&version_dir).unwrap();
		let binary = version_dir.join("appserver");
		std::fs::write(&binary, format!("#!/bin/sh\n{}\n", script)).unwrap();
		std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

		let store = Arc::new(LeanStore::default());
		store.repositories.lock().push(Repository {
			id: "repo1".into(),
			repo: "upstream/appserver".into(),
			token: None,
			release_file_pattern: ".*linux_amd64.zip".into(),
			exec_file_pattern: "^appserver$".into(),
			retention: 3,
			disabled: false,
			created: Timestamp::now(),
		});
		store.releases.lock().push(Release {
			id: "rel1".into(),
			repository_id: "repo1".into(),
			version: "0.26.1".into(),
			release_name: "0.26.1".into(),
			published_at: Timestamp::now(),
			asset_id: "1".into(),
			asset_file_name: "appserver_linux_amd64.zip".into(),
			download_url: "".into(),
			asset_size: 1,
		});
		store.services.lock().push(Service {
			id: "svc1".into(),
			name: "first".into(),
			release_id: "rel1".into(),
			restart_policy,
			status: ServiceStatus::Idle,
			ip: None,
			port: None,
			error_message: None,
			last_started: None,
			deleted: None,
			install_token: None,
			boot_user_email: None,
			boot_user_password: None,
			created: Timestamp::now(),
		});

		let logs = ServiceLogStore::new().await.unwrap();
		let supervisor = ServiceSupervisor::new(
			store.clone(),
			logs,
			SupervisorConfig {
				bind_ip: "127.0.0.1".into(),
				data_dir: data_dir.path().to_path_buf(),
				download_dir: download_dir.path().to_path_buf(),
			},
		);

		Fixture {
			store,
			supervisor,
			_download_dir: download_dir,
			_data_dir: data_dir,
		}
	}

	#[tokio::test]
	async fn start_command_brings_service_up() {
		let fx = fixture("sleep 60", RestartPolicy::No).await;
		fx.store.enqueue_command("svc1", CommandAction::Start).await.unwrap();

		fx.supervisor.run().await.unwrap();

		let service = fx.store.service("svc1");
		assert_eq!(service.status, ServiceStatus::Running);
		assert!(service.port.unwrap() > 0);
		assert!(service.last_started.is_some());
		assert!(fx.supervisor.is_running("svc1"));

		let commands = fx.store.commands_snapshot();
		assert_eq!(commands[0].status, CommandStatus::Success);
		assert!(commands[0].executed.is_some());

		fx.supervisor.dispose().await.unwrap();
	}

	#[tokio::test]
	async fn second_start_reports_already_running() {
		let fx = fixture("sleep 60", RestartPolicy::No).await;
		fx.store.enqueue_command("svc1", CommandAction::Start).await.unwrap();
		fx.supervisor.run().await.unwrap();

		fx.store.enqueue_command("svc1", CommandAction::Start).await.unwrap();
		fx.supervisor.run().await.unwrap();

		let commands = fx.store.commands_snapshot();
		assert_eq!(commands[1].status, CommandStatus::Error);
		assert!(commands[1].error_message.as_deref().unwrap().contains("already running"));
		// The healthy instance keeps running
		assert_eq!(fx.store.service("svc1").status, ServiceStatus::Running);

		fx.supervisor.dispose().await.unwrap();
	}

	#[tokio::test]
	async fn stop_without_live_process_errors() {
		let fx = fixture("sleep 60", RestartPolicy::No).await;
		fx.store.enqueue_command("svc1", CommandAction::Stop).await.unwrap();

		fx.supervisor.run().await.unwrap();

		let commands = fx.store.commands_snapshot();
		assert_eq!(commands[0].status, CommandStatus::Error);
	}

	#[tokio::test]
	async fn stop_command_stops_running_service() {
		let fx = fixture("sleep 60", RestartPolicy::No).await;
		fx.store.enqueue_command("svc1", CommandAction::Start).await.unwrap();
		fx.supervisor.run().await.unwrap();

		fx.store.enqueue_command("svc1", CommandAction::Stop).await.unwrap();
		fx.supervisor.run().await.unwrap();

		assert_eq!(fx.store.service("svc1").status, ServiceStatus::Stopped);
		assert!(!fx.supervisor.is_running("svc1"));
	}

	#[tokio::test]
	async fn crash_with_on_failure_policy_schedules_restart() {
		let fx = fixture("exit 7", RestartPolicy::OnFailure).await;
		fx.store.enqueue_command("svc1", CommandAction::Start).await.unwrap();

		fx.supervisor.run().await.unwrap();
		// Give the monitor and the failure drain time to observe the exit
		tokio::time::sleep(Duration::from_millis(300)).await;

		let service = fx.store.service("svc1");
		assert_eq!(service.status, ServiceStatus::Failure);
		assert!(service.error_message.as_deref().unwrap().contains("exited with error"));

		let pending_starts = fx
			.store
			.commands_snapshot()
			.iter()
			.filter(|c| c.status == CommandStatus::Pending && c.action == CommandAction::Start)
			.count();
		assert_eq!(pending_starts, 1);
	}

	#[tokio::test]
	async fn crash_with_no_policy_stays_failed() {
		let fx = fixture("exit 7", RestartPolicy::No).await;
		fx.store.enqueue_command("svc1", CommandAction::Start).await.unwrap();

		fx.supervisor.run().await.unwrap();
		tokio::time::sleep(Duration::from_millis(300)).await;

		assert_eq!(fx.store.service("svc1").status, ServiceStatus::Failure);
		let pending = fx
			.store
			.commands_snapshot()
			.iter()
			.filter(|c| c.status == CommandStatus::Pending)
			.count();
		assert_eq!(pending, 0);
	}

	#[tokio::test]
	async fn recovery_restarts_recorded_running_services() {
		let fx = fixture("sleep 60", RestartPolicy::No).await;
		// Simulate a previous launcher run: the row says running, no handle
		fx.store.mark_service_running("svc1", "127.0.0.1", 1).await.unwrap();

		fx.supervisor.run().await.unwrap();

		let service = fx.store.service("svc1");
		assert_eq!(service.status, ServiceStatus::Running);
		assert_ne!(service.port, Some(1), "recovery re-assigns the endpoint");
		assert!(fx.supervisor.is_running("svc1"));

		fx.supervisor.dispose().await.unwrap();
	}

	#[tokio::test]
	async fn missing_binary_marks_service_failed() {
		let fx = fixture("sleep 60", RestartPolicy::No).await;
		fx.store.repositories.lock()[0].exec_file_pattern = "^does-not-exist$".into();
		fx.store.enqueue_command("svc1", CommandAction::Start).await.unwrap();

		fx.supervisor.run().await.unwrap();

		let service = fx.store.service("svc1");
		assert_eq!(service.status, ServiceStatus::Failure);
		assert!(service.error_message.as_deref().unwrap().contains("binary not found"));
		assert_eq!(fx.store.commands_snapshot()[0].status, CommandStatus::Error);
	}
}

// vim: ts=4
