//! Sequential task executor. Runs the periodic control-plane loops one at a
//! time, in priority order, with no overlap.
//!
//! Every control-plane loop (certificate renewal, request planning, request
//! execution, release sync, supervisor tick) shares the record store and the
//! filesystem, so they need mutual exclusion. A single worker dequeues one
//! task, runs it to completion, and only then picks the next one. After a
//! task completes it is re-enqueued by an independent timer `interval` later,
//! which guarantees no overlap even when a task overruns its period.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

/// Type-erased task body. Receives the executor's cancellation token and
/// must observe it across long-running operations.
pub type TaskAction =
	Arc<dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct Task {
	action: TaskAction,
	interval: Duration,
	priority: i32,
}

impl Task {
	pub fn new(action: TaskAction, interval: Duration, priority: i32) -> Self {
		Self { action, interval, priority }
	}

	/// Convenience constructor wrapping an async closure.
	pub fn from_fn<F, Fut>(f: F, interval: Duration, priority: i32) -> Self
	where
		F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		Self::new(Arc::new(move |cancel| Box::pin(f(cancel))), interval, priority)
	}

	/// Runs the task body to completion, then schedules its own re-enqueue
	/// after `interval` on an independent timer. The timer is dropped when
	/// the executor is cancelled.
	async fn exec(self: Arc<Self>, cancel: CancellationToken, queue: flume::Sender<Arc<Task>>) {
		(self.action)(cancel.clone()).await;

		let interval = self.interval;
		tokio::spawn(async move {
			tokio::select! {
				() = cancel.cancelled() => {}
				() = tokio::time::sleep(interval) => {
					let _ = queue.send_async(self).await;
				}
			}
		});
	}
}

struct Inner {
	running: bool,
	tasks: Vec<Arc<Task>>,
	cancel: Option<CancellationToken>,
}

pub struct SequentialExecutor {
	inner: Mutex<Inner>,
}

impl SequentialExecutor {
	pub fn new() -> Self {
		Self { inner: Mutex::new(Inner { running: false, tasks: Vec::new(), cancel: None }) }
	}

	/// Registers a task. Tasks must be added before `start`.
	pub fn add(&self, task: Task) -> SwResult<()> {
		if task.interval.is_zero() {
			return Err(Error::ValidationError("task interval must be greater than zero".into()));
		}

		let mut inner = self.inner.lock();
		if inner.running {
			return Err(Error::InvalidState("cannot add tasks while running".into()));
		}
		inner.tasks.push(Arc::new(task));
		Ok(())
	}

	/// Starts the single worker. Tasks are enqueued once, ordered by
	/// descending priority. Idempotent.
	pub fn start(&self) -> SwResult<()> {
		let mut inner = self.inner.lock();
		if inner.running {
			return Ok(());
		}

		let mut tasks = inner.tasks.clone();
		tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

		let (tx, rx) = flume::unbounded::<Arc<Task>>();
		for task in tasks {
			let _ = tx.send(task);
		}

		let cancel = CancellationToken::new();
		inner.cancel = Some(cancel.clone());
		inner.running = true;

		tokio::spawn(async move {
			loop {
				tokio::select! {
					() = cancel.cancelled() => break,
					task = rx.recv_async() => {
						let Ok(task) = task else { break };
						task.exec(cancel.clone(), tx.clone()).await;
					}
				}
			}
			debug!("sequential executor worker stopped");
		});

		Ok(())
	}

	/// Cancels the worker; pending and scheduled re-enqueues are dropped.
	/// Idempotent.
	pub fn stop(&self) -> SwResult<()> {
		let mut inner = self.inner.lock();
		if !inner.running {
			return Ok(());
		}
		inner.running = false;
		if let Some(cancel) = inner.cancel.take() {
			cancel.cancel();
		}
		Ok(())
	}
}

impl Default for SequentialExecutor {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

	fn counting_task(
		log: Arc<Mutex<Vec<u32>>>,
		id: u32,
		interval: Duration,
		priority: i32,
	) -> Task {
		Task::from_fn(
			move |_cancel| {
				let log = log.clone();
				async move {
					log.lock().push(id);
				}
			},
			interval,
			priority,
		)
	}

	#[test]
	fn add_rejects_zero_interval() {
		let executor = SequentialExecutor::new();
		let task = Task::from_fn(|_| async {}, Duration::ZERO, 0);
		assert!(executor.add(task).is_err());
	}

	#[tokio::test]
	async fn add_after_start_fails() {
		let executor = SequentialExecutor::new();
		executor.start().unwrap();
		let task = Task::from_fn(|_| async {}, Duration::from_secs(1), 0);
		assert!(executor.add(task).is_err());
		executor.stop().unwrap();
	}

	#[tokio::test]
	async fn start_and_stop_are_idempotent() {
		let executor = SequentialExecutor::new();
		executor.start().unwrap();
		executor.start().unwrap();
		executor.stop().unwrap();
		executor.stop().unwrap();
	}

	#[tokio::test]
	async fn first_round_runs_in_priority_order() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let executor = SequentialExecutor::new();

		executor.add(counting_task(log.clone(), 1, Duration::from_secs(60), 10)).unwrap();
		executor.add(counting_task(log.clone(), 2, Duration::from_secs(60), 100)).unwrap();
		executor.add(counting_task(log.clone(), 3, Duration::from_secs(60), 50)).unwrap();

		executor.start().unwrap();
		tokio::time::sleep(Duration::from_millis(200)).await;
		executor.stop().unwrap();

		assert_eq!(*log.lock(), vec![2, 3, 1]);
	}

	#[tokio::test]
	async fn tasks_never_overlap() {
		let active = Arc::new(AtomicBool::new(false));
		let overlapped = Arc::new(AtomicBool::new(false));
		let executor = SequentialExecutor::new();

		for _ in 0..3 {
			let active = active.clone();
			let overlapped = overlapped.clone();
			let task = Task::from_fn(
				move |_cancel| {
					let active = active.clone();
					let overlapped = overlapped.clone();
					async move {
						if active.swap(true, Ordering::SeqCst) {
							overlapped.store(true, Ordering::SeqCst);
						}
						tokio::time::sleep(Duration::from_millis(30)).await;
						active.store(false, Ordering::SeqCst);
					}
				},
				Duration::from_millis(10),
				0,
			);
			executor.add(task).unwrap();
		}

		executor.start().unwrap();
		tokio::time::sleep(Duration::from_millis(400)).await;
		executor.stop().unwrap();

		assert!(!overlapped.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn task_is_rescheduled_after_interval() {
		let count = Arc::new(AtomicU32::new(0));
		let executor = SequentialExecutor::new();

		let counter = count.clone();
		let task = Task::from_fn(
			move |_cancel| {
				let counter = counter.clone();
				async move {
					counter.fetch_add(1, Ordering::SeqCst);
				}
			},
			Duration::from_millis(50),
			0,
		);
		executor.add(task).unwrap();

		executor.start().unwrap();
		tokio::time::sleep(Duration::from_millis(280)).await;
		executor.stop().unwrap();

		let runs = count.load(Ordering::SeqCst);
		assert!(runs >= 3, "expected at least 3 runs, got {}", runs);

		// No further runs after stop
		tokio::time::sleep(Duration::from_millis(150)).await;
		assert_eq!(count.load(Ordering::SeqCst), runs);
	}
}

// vim: ts=4
