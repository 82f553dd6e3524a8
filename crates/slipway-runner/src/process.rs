//! One supervised child process: Stopped → Starting → Running → Stopping →
//! Stopped, with a background monitor awaiting exit.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::prelude::*;

const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
	Stopped,
	Starting,
	Running,
	Stopping,
}

/// Reported by the monitor when the child exits with an error other than
/// "terminated via signal".
#[derive(Debug, Clone)]
pub struct ProcessErrorMessage {
	pub id: Box<str>,
	pub error: String,
}

/// Pluggable byte sink for a child output stream.
#[async_trait]
pub trait OutputSink: Send + Sync {
	async fn write(&self, data: &[u8]);
}

/// Mirrors bytes to a target sink while invoking a callback on every write.
/// Used for install-token sniffing on stdout.
pub struct InterceptSink {
	target: Arc<dyn OutputSink>,
	on_write: Box<dyn Fn(&[u8]) + Send + Sync>,
}

impl InterceptSink {
	pub fn new(target: Arc<dyn OutputSink>, on_write: Box<dyn Fn(&[u8]) + Send + Sync>) -> Self {
		Self { target, on_write }
	}
}

#[async_trait]
impl OutputSink for InterceptSink {
	async fn write(&self, data: &[u8]) {
		(self.on_write)(data);
		self.target.write(data).await;
	}
}

#[derive(Default)]
pub struct ProcessOptions {
	pub error_chan: Option<flume::Sender<ProcessErrorMessage>>,
	pub stdout: Option<Arc<dyn OutputSink>>,
	pub stderr: Option<Arc<dyn OutputSink>>,
}

pub struct Process {
	id: Box<str>,
	command: Box<str>,
	args: Vec<Box<str>>,
	options: ProcessOptions,

	state: RwLock<ProcessState>,
	pid: RwLock<Option<u32>>,
	/// Disconnects when the monitor observes exit
	done: Mutex<Option<flume::Receiver<()>>>,
}

impl Process {
	pub fn new(
		id: impl Into<Box<str>>,
		command: impl Into<Box<str>>,
		args: Vec<Box<str>>,
		options: ProcessOptions,
	) -> Arc<Self> {
		Arc::new(Self {
			id: id.into(),
			command: command.into(),
			args,
			options,
			state: RwLock::new(ProcessState::Stopped),
			pid: RwLock::new(None),
			done: Mutex::new(None),
		})
	}

	pub fn status(&self) -> ProcessState {
		*self.state.read()
	}

	pub fn is_running(&self) -> bool {
		self.status() == ProcessState::Running
	}

	fn set_state(&self, state: ProcessState) {
		*self.state.write() = state;
	}

	/// Launches the command. A no-op when the process is not Stopped; a
	/// spawn failure leaves it Stopped.
	pub async fn start(self: &Arc<Self>) -> SwResult<()> {
		if self.status() != ProcessState::Stopped {
			return Ok(());
		}
		self.set_state(ProcessState::Starting);

		let mut cmd = tokio::process::Command::new(self.command.as_ref());
		cmd.args(self.args.iter().map(AsRef::as_ref))
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.stdin(Stdio::null());

		let mut child = match cmd.spawn() {
			Ok(child) => child,
			Err(err) => {
				self.set_state(ProcessState::Stopped);
				error!("failed to start process {}: {}", self.id, err);
				return Err(err.into());
			}
		};
		*self.pid.write() = child.id();

		if let Some(stdout) = child.stdout.take() {
			if let Some(sink) = self.options.stdout.clone() {
				tokio::spawn(pump_stream(stdout, sink));
			}
		}
		if let Some(stderr) = child.stderr.take() {
			if let Some(sink) = self.options.stderr.clone() {
				tokio::spawn(pump_stream(stderr, sink));
			}
		}

		let (done_tx, done_rx) = flume::bounded::<()>(1);
		*self.done.lock() = Some(done_rx);

		let monitor = self.clone();
		tokio::spawn(async move {
			monitor.wait_for_exit(child).await;
			drop(done_tx);
		});

		self.set_state(ProcessState::Running);
		Ok(())
	}

	async fn wait_for_exit(&self, mut child: tokio::process::Child) {
		match child.wait().await {
			Ok(status) if !status.success() => {
				if !terminated_by_signal(&status) {
					let message = format!("process exited with error: {}", status);
					error!("{} ({})", message, self.id);
					if let Some(ref chan) = self.options.error_chan {
						let _ = chan
							.send_async(ProcessErrorMessage { id: self.id.clone(), error: message })
							.await;
					}
				}
			}
			Ok(_) => {}
			Err(err) => {
				error!("failed to await process {}: {}", self.id, err);
			}
		}
		*self.pid.write() = None;
		self.set_state(ProcessState::Stopped);
	}

	/// Sends SIGTERM, waits up to 10 s, escalates to SIGKILL. A no-op when
	/// the process is not Running; a failed signal leaves it Running.
	pub async fn stop(&self) -> SwResult<()> {
		if self.status() != ProcessState::Running {
			return Ok(());
		}

		let Some(pid) = *self.pid.read() else {
			warn!("stop ignored: no active pid for process {}", self.id);
			return Ok(());
		};

		self.set_state(ProcessState::Stopping);
		if let Err(err) = send_signal(pid, false) {
			self.set_state(ProcessState::Running);
			error!("failed to stop process {}: {}", self.id, err);
			return Err(err);
		}

		let done = self.done.lock().clone();
		if let Some(done) = done {
			tokio::select! {
				_ = done.recv_async() => {}
				() = tokio::time::sleep(STOP_GRACE) => {
					warn!("process {} ignored SIGTERM, sending SIGKILL", self.id);
					let _ = send_signal(pid, true);
					let _ = done.recv_async().await;
				}
			}
		}
		Ok(())
	}
}

async fn pump_stream(
	stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
	sink: Arc<dyn OutputSink>,
) {
	let mut lines = BufReader::new(stream).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		sink.write(line.as_bytes()).await;
	}
}

#[cfg(unix)]
fn terminated_by_signal(status: &std::process::ExitStatus) -> bool {
	use std::os::unix::process::ExitStatusExt;
	status.signal() == Some(nix::sys::signal::Signal::SIGTERM as i32)
		|| status.signal() == Some(nix::sys::signal::Signal::SIGKILL as i32)
}

#[cfg(not(unix))]
fn terminated_by_signal(_status: &std::process::ExitStatus) -> bool {
	false
}

#[cfg(unix)]
fn send_signal(pid: u32, kill: bool) -> SwResult<()> {
	use nix::sys::signal::{kill as send, Signal};
	use nix::unistd::Pid;

	let signal = if kill { Signal::SIGKILL } else { Signal::SIGTERM };
	send(Pid::from_raw(pid as i32), signal)
		.map_err(|err| Error::InvalidState(format!("signal {} failed: {}", signal, err)))
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _kill: bool) -> SwResult<()> {
	Err(Error::InvalidState("signals are not supported on this platform".into()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex as PlMutex;

	struct CollectSink {
		data: PlMutex<Vec<u8>>,
	}

	#[async_trait]
	impl OutputSink for CollectSink {
		async fn write(&self, data: &[u8]) {
			let mut buf = self.data.lock();
			buf.extend_from_slice(data);
			buf.push(b'\n');
		}
	}

	#[tokio::test]
	async fn start_stop_lifecycle() {
		let process = Process::new(
			"svc-1",
			"sleep",
			vec!["60".into()],
			ProcessOptions::default(),
		);

		process.start().await.unwrap();
		assert_eq!(process.status(), ProcessState::Running);

		// Start on a running process is a silent no-op
		process.start().await.unwrap();
		assert_eq!(process.status(), ProcessState::Running);

		process.stop().await.unwrap();
		assert_eq!(process.status(), ProcessState::Stopped);

		// Second stop is a no-op
		process.stop().await.unwrap();
		assert_eq!(process.status(), ProcessState::Stopped);
	}

	#[tokio::test]
	async fn spawn_failure_returns_to_stopped() {
		let process = Process::new(
			"svc-bad",
			"/definitely/not/a/binary",
			vec![],
			ProcessOptions::default(),
		);

		assert!(process.start().await.is_err());
		assert_eq!(process.status(), ProcessState::Stopped);
	}

	#[tokio::test]
	async fn error_exit_is_reported() {
		let (tx, rx) = flume::unbounded();
		let process = Process::new(
			"svc-crash",
			"sh",
			vec!["-c".into(), "exit 3".into()],
			ProcessOptions { error_chan: Some(tx), ..Default::default() },
		);

		process.start().await.unwrap();
		let message = rx.recv_async().await.unwrap();
		assert_eq!(message.id.as_ref(), "svc-crash");
		assert!(message.error.contains("exited with error"));
	}

	#[tokio::test]
	async fn sigterm_exit_is_not_reported() {
		let (tx, rx) = flume::unbounded();
		let process = Process::new(
			"svc-term",
			"sleep",
			vec!["60".into()],
			ProcessOptions { error_chan: Some(tx), ..Default::default() },
		);

		process.start().await.unwrap();
		process.stop().await.unwrap();

		tokio::time::sleep(Duration::from_millis(100)).await;
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn stdout_reaches_the_sink() {
		let sink = Arc::new(CollectSink { data: PlMutex::new(Vec::new()) });
		let process = Process::new(
			"svc-out",
			"sh",
			vec!["-c".into(), "echo hello-out".into()],
			ProcessOptions {
				stdout: Some(sink.clone()),
				..Default::default()
			},
		);

		process.start().await.unwrap();
		tokio::time::sleep(Duration::from_millis(200)).await;

		let data = sink.data.lock().clone();
		assert!(String::from_utf8_lossy(&data).contains("hello-out"));
	}

	#[tokio::test]
	async fn intercept_sink_sees_every_write() {
		let sink = Arc::new(CollectSink { data: PlMutex::new(Vec::new()) });
		let seen = Arc::new(PlMutex::new(Vec::<u8>::new()));
		let seen_clone = seen.clone();
		let intercept = Arc::new(InterceptSink::new(
			sink.clone(),
			Box::new(move |data| seen_clone.lock().extend_from_slice(data)),
		));

		intercept.write(b"token-line").await;
		assert_eq!(seen.lock().as_slice(), b"token-line");
		assert!(String::from_utf8_lossy(&sink.data.lock()).contains("token-line"));
	}
}

// vim: ts=4
