//! Bounded-concurrency scheduler for deferred tasks.
//!
//! Submissions return immediately with a [`TaskId`] and are pushed onto one
//! job channel. A single dispatcher drains it in submission order, waits for
//! one of `concurrency` slots, marks the task started and spawns its body
//! holding the slot. Tasks therefore start in the order they were submitted,
//! whichever threads the callers run on. Callers poll
//! [`TaskScheduler::status`], fetch the outcome with
//! [`TaskScheduler::result`] and may request cooperative cancellation.
//!
//! # Bookkeeping
//!
//! ```text
//! submit ──► running: HashMap<TaskId, RunningTask>   (WAITING → RUNNING)
//!                │  finish
//!                ▼
//!            results: ResultStore                     (FINISHED | FAILED)
//!                │  retention elapsed + sweep
//!                ▼
//!             evicted
//! ```
//!
//! Both maps live behind one lock, so an id is never observed in both.
//!
//! # Known limitation
//!
//! A task submitted with `depends_on` takes its slot as soon as it is
//! dequeued and then waits for the dependency while holding it.

mod config;
#[cfg(test)]
mod tests;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub use config::{DEFAULT_CONCURRENCY, SchedulerConfig};
use futures_util::FutureExt;
use parking_lot::Mutex;
use pw_longrun_protocol::{TaskListing, TaskStatus, TaskStatusMessage};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::control::TaskControl;
use crate::error::{Error, Result};
use crate::identity::{self, IdSource, TaskId};
use crate::results::ResultStore;
use crate::task::{ResultProducer, Task};

/// Resolves with the task's producer once it has finished.
type FinishedRx = watch::Receiver<Option<ResultProducer>>;

struct RunningTask {
	control: TaskControl,
	started: bool,
	failed: bool,
	finished: FinishedRx,
	/// Submission sequence number, only used to correlate log lines.
	order: u64,
	abort: Option<AbortHandle>,
}

/// A submitted task waiting for the dispatcher.
struct Job {
	id: TaskId,
	order: u64,
	control: TaskControl,
	task: Task,
	dependency: Option<FinishedRx>,
	finished: watch::Sender<Option<ResultProducer>>,
}

struct SchedulerState {
	running: HashMap<TaskId, RunningTask>,
	results: ResultStore,
}

struct Inner {
	config: SchedulerConfig,
	state: Mutex<SchedulerState>,
	slots: Arc<Semaphore>,
	ids: IdSource,
	next_order: AtomicU64,
	closed: AtomicBool,
	jobs: mpsc::UnboundedSender<Job>,
	dispatcher: Mutex<Option<JoinHandle<()>>>,
	sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Options accepted alongside a task by [`TaskScheduler::accept`].
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
	/// Wait for this task to finish before running the body.
	pub depends_on: Option<TaskId>,
	/// Bypass the queue and run the task inline.
	pub immediate: bool,
}

/// Outcome of [`TaskScheduler::accept`].
#[derive(Debug)]
pub enum Submission {
	/// The task was queued under this id.
	Queued(TaskId),
	/// The task ran inline; this is its outcome.
	Completed(ResultProducer),
}

/// Status of a known task, as returned by [`TaskScheduler::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
	pub id: TaskId,
	pub status: TaskStatus,
	pub message: String,
	pub progress: u32,
	pub progress_message: Option<String>,
}

impl From<TaskReport> for TaskStatusMessage {
	fn from(report: TaskReport) -> Self {
		TaskStatusMessage::new(report.status, report.message, report.id.to_string())
			.with_progress(report.progress, report.progress_message)
	}
}

/// Answer to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
	/// The task was still running and has been flagged.
	Cancelled,
	/// The task already finished; nothing to cancel.
	Conflict,
	NotFound,
}

/// Accepts deferred tasks and runs them on a bounded number of slots.
///
/// Cheap to clone; all clones share one scheduler. Construct inside a tokio
/// runtime and call [`shutdown`](Self::shutdown) when done.
#[derive(Clone)]
pub struct TaskScheduler {
	inner: Arc<Inner>,
}

impl TaskScheduler {
	pub fn new(config: SchedulerConfig) -> Self {
		Self::with_id_source(config, identity::random_ids())
	}

	/// Creates a scheduler drawing candidate ids from `ids`.
	pub fn with_id_source(config: SchedulerConfig, ids: IdSource) -> Self {
		let config = SchedulerConfig {
			concurrency: config.concurrency.max(1),
			..config
		};
		let slots = Arc::new(Semaphore::new(config.concurrency));
		let (jobs, queue) = mpsc::unbounded_channel();
		let inner = Arc::new(Inner {
			slots: Arc::clone(&slots),
			state: Mutex::new(SchedulerState {
				running: HashMap::new(),
				results: ResultStore::new(config.retention),
			}),
			ids,
			next_order: AtomicU64::new(0),
			closed: AtomicBool::new(false),
			jobs,
			dispatcher: Mutex::new(None),
			sweeper: Mutex::new(None),
			config,
		});

		*inner.dispatcher.lock() = Some(tokio::spawn(dispatch(Arc::downgrade(&inner), slots, queue)));

		if let Some(every) = inner.config.sweep_interval.filter(|d| !d.is_zero()) {
			*inner.sweeper.lock() = Some(spawn_sweeper(Arc::downgrade(&inner), every));
		}

		Self { inner }
	}

	pub fn config(&self) -> &SchedulerConfig {
		&self.inner.config
	}

	/// Runs `task` inline or queues it, depending on `options.immediate`.
	pub async fn accept(&self, task: Task, options: SubmitOptions) -> Result<Submission> {
		if options.immediate {
			if self.inner.closed.load(Ordering::Acquire) {
				return Err(Error::ShutDown);
			}
			return Ok(Submission::Completed(self.execute_immediately(task).await));
		}
		self.submit(task, options.depends_on.as_ref()).map(Submission::Queued)
	}

	/// Queues `task` and returns its id without waiting for it to start.
	///
	/// If `depends_on` names a task that is still running, the body starts
	/// only after that task finished. Unknown or finished dependencies are
	/// ignored.
	pub fn submit(&self, task: Task, depends_on: Option<&TaskId>) -> Result<TaskId> {
		if self.inner.closed.load(Ordering::Acquire) {
			return Err(Error::ShutDown);
		}

		let order = self.inner.next_order.fetch_add(1, Ordering::Relaxed);
		let control = TaskControl::new();
		let (finished_tx, finished_rx) = watch::channel(None);

		let (id, waits) = {
			let mut state = self.inner.state.lock();
			state.results.sweep(Instant::now());

			let id = identity::allocate(&self.inner.ids, self.inner.config.max_id_attempts, |candidate| {
				state.running.contains_key(candidate) || state.results.contains(candidate)
			})?;
			let dependency = depends_on
				.and_then(|dep| state.running.get(dep))
				.map(|running| running.finished.clone());
			let waits = dependency.is_some();

			state.running.insert(
				id.clone(),
				RunningTask {
					control: control.clone(),
					started: false,
					failed: false,
					finished: finished_rx,
					order,
					abort: None,
				},
			);

			// Sent under the lock so channel order matches submission order.
			let job = Job {
				id: id.clone(),
				order,
				control,
				task,
				dependency,
				finished: finished_tx,
			};
			if self.inner.jobs.send(job).is_err() {
				state.running.remove(&id);
				return Err(Error::ShutDown);
			}
			(id, waits)
		};

		debug!(
			target = "longrun.scheduler",
			task_id = %id,
			order,
			depends_on = depends_on.map(|d| d.as_str()).unwrap_or(""),
			waits,
			"task queued"
		);

		Ok(id)
	}

	/// Runs `task` to completion without queueing or registering an id.
	///
	/// Failures and panics are folded into a failure producer.
	pub async fn execute_immediately(&self, task: Task) -> ResultProducer {
		match run_guarded(task(TaskControl::new())).await {
			Ok(producer) => producer,
			Err(err) => {
				warn!(target = "longrun.scheduler", error = %err, "immediate task failed");
				ResultProducer::failure(err)
			}
		}
	}

	/// Current stage of `id`.
	pub fn status(&self, id: &TaskId) -> Result<TaskReport> {
		let state = self.inner.state.lock();
		if let Some(running) = state.running.get(id) {
			let snapshot = running.control.snapshot();
			let (status, message) = if running.started {
				(TaskStatus::Running, "Task is running")
			} else {
				(TaskStatus::Waiting, "Task is waiting")
			};
			return Ok(TaskReport {
				id: id.clone(),
				status,
				message: message.to_string(),
				progress: snapshot.progress,
				progress_message: snapshot.progress_message,
			});
		}

		if let Some(result) = state.results.get(id) {
			return Ok(TaskReport {
				id: id.clone(),
				status: if result.failed {
					TaskStatus::Failed
				} else {
					TaskStatus::Finished
				},
				message: "Task has finished".to_string(),
				progress: crate::control::PROGRESS_COMPLETE,
				progress_message: None,
			});
		}

		Err(Error::NotFound(id.clone()))
	}

	/// Stored outcome of a finished task.
	///
	/// Returns [`Error::NotFound`] while the task is still running, after its
	/// result was evicted, or for unknown ids.
	pub fn result(&self, id: &TaskId) -> Result<ResultProducer> {
		self.inner
			.state
			.lock()
			.results
			.get(id)
			.map(|result| result.producer.clone())
			.ok_or_else(|| Error::NotFound(id.clone()))
	}

	/// Requests cooperative cancellation of a running task.
	pub fn cancel(&self, id: &TaskId) -> CancelOutcome {
		let state = self.inner.state.lock();
		if let Some(running) = state.running.get(id) {
			running.control.cancel();
			info!(target = "longrun.scheduler", task_id = %id, order = running.order, "task cancellation requested");
			CancelOutcome::Cancelled
		} else if state.results.contains(id) {
			CancelOutcome::Conflict
		} else {
			CancelOutcome::NotFound
		}
	}

	/// Ids of running and finished tasks.
	pub fn list(&self) -> TaskListing {
		let state = self.inner.state.lock();
		let mut queued: Vec<&TaskId> = state.running.keys().collect();
		queued.sort();
		TaskListing {
			queued_tasks: queued.into_iter().map(ToString::to_string).collect(),
			finished_tasks: state.results.ids().iter().map(ToString::to_string).collect(),
		}
	}

	/// Evicts expired results now, returning how many were dropped.
	pub fn sweep(&self) -> usize {
		self.inner.sweep()
	}

	pub fn is_shut_down(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	/// Stops the sweeper, flags and aborts all queued and running tasks, and
	/// drops every retained result. Later submissions fail with
	/// [`Error::ShutDown`].
	pub fn shutdown(&self) {
		if self.inner.closed.swap(true, Ordering::AcqRel) {
			return;
		}

		if let Some(sweeper) = self.inner.sweeper.lock().take() {
			sweeper.abort();
		}
		if let Some(dispatcher) = self.inner.dispatcher.lock().take() {
			dispatcher.abort();
		}
		self.inner.slots.close();

		let drained: Vec<RunningTask> = {
			let mut state = self.inner.state.lock();
			state.results.clear();
			state.running.drain().map(|(_, running)| running).collect()
		};

		info!(target = "longrun.scheduler", aborted = drained.len(), "scheduler shut down");
		for running in drained {
			running.control.cancel();
			if let Some(abort) = running.abort {
				abort.abort();
			}
		}
	}
}

impl Inner {
	/// Returns false if `id` is no longer tracked, e.g. after shutdown.
	fn mark_started(&self, id: &TaskId) -> bool {
		match self.state.lock().running.get_mut(id) {
			Some(running) => {
				running.started = true;
				true
			}
			None => false,
		}
	}

	fn attach(&self, id: &TaskId, abort: AbortHandle) {
		match self.state.lock().running.get_mut(id) {
			Some(running) => running.abort = Some(abort),
			// Drained by a shutdown racing the spawn.
			None if self.closed.load(Ordering::Acquire) => abort.abort(),
			None => {}
		}
	}

	fn mark_failed(&self, id: &TaskId) {
		if let Some(running) = self.state.lock().running.get_mut(id) {
			running.failed = true;
		}
	}

	/// Moves `id` from the running set to the result store.
	fn finish(&self, id: &TaskId, producer: ResultProducer) {
		let mut state = self.state.lock();
		if let Some(running) = state.running.remove(id) {
			state.results.insert(id.clone(), producer, running.failed);
		}
		state.results.sweep(Instant::now());
	}

	fn sweep(&self) -> usize {
		let evicted = self.state.lock().results.sweep(Instant::now());
		if evicted > 0 {
			debug!(target = "longrun.scheduler", evicted, "evicted expired results");
		}
		evicted
	}
}

/// Starts queued jobs one at a time, in channel order, as slots free up.
async fn dispatch(inner: Weak<Inner>, slots: Arc<Semaphore>, mut queue: mpsc::UnboundedReceiver<Job>) {
	while let Some(job) = queue.recv().await {
		let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
			break;
		};
		let Some(inner) = inner.upgrade() else {
			break;
		};
		if !inner.mark_started(&job.id) {
			continue;
		}
		debug!(target = "longrun.scheduler", task_id = %job.id, order = job.order, "task started");

		let id = job.id.clone();
		let handle = tokio::spawn(execute(Arc::clone(&inner), job, permit));
		inner.attach(&id, handle.abort_handle());
	}
}

async fn execute(inner: Arc<Inner>, job: Job, permit: OwnedSemaphorePermit) {
	let Job {
		id,
		order,
		control,
		task,
		dependency,
		finished,
	} = job;

	let body = async move {
		if let Some(mut dependency) = dependency {
			// A dropped sender means the dependency was aborted; proceed anyway.
			let _ = dependency.wait_for(Option::is_some).await;
		}
		task(control).await
	};
	let outcome = run_guarded(body).await;
	drop(permit);

	let producer = match outcome {
		Ok(producer) => {
			debug!(target = "longrun.scheduler", task_id = %id, order, "task finished");
			producer
		}
		Err(err) => {
			warn!(target = "longrun.scheduler", task_id = %id, order, error = %err, "task failed");
			inner.mark_failed(&id);
			ResultProducer::failure(err)
		}
	};

	inner.finish(&id, producer.clone());
	finished.send_replace(Some(producer));
}

/// Awaits a task body, converting a panic into [`Error::OperationFailed`].
async fn run_guarded<F>(body: F) -> Result<ResultProducer>
where
	F: Future<Output = Result<ResultProducer>>,
{
	match AssertUnwindSafe(body).catch_unwind().await {
		Ok(outcome) => outcome,
		Err(panic) => Err(Error::operation_failed(format!("Task panicked: {}", panic_message(&*panic)))),
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
	panic
		.downcast_ref::<&str>()
		.copied()
		.or_else(|| panic.downcast_ref::<String>().map(String::as_str))
		.unwrap_or("unknown panic")
}

fn spawn_sweeper(inner: Weak<Inner>, every: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			let Some(inner) = inner.upgrade() else {
				break;
			};
			inner.sweep();
		}
	})
}
