use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::MutexGuard;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::operation::{LoginOperation, PageKind, RemoteOperation};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct SessionState {
	last_login: Option<Instant>,
	refresh_counter: u32,
	logins: u64,
	rotations: u64,
}

/// Counters describing a session queue, as returned by
/// [`SessionOperationQueue::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
	pub logins: u64,
	pub rotations: u64,
	pub refresh_counter: u32,
	/// Time since the last successful login, `None` before the first one.
	pub last_login_age: Option<Duration>,
}

/// Serializes remote operations against one session.
///
/// Every unit of work (explicit [`run`](Self::run) calls, refresh ticks and
/// forced rotations) takes the same FIFO lock, so no two remote calls ever
/// overlap, logins included.
pub struct SessionOperationQueue {
	config: SessionConfig,
	login: Arc<dyn LoginOperation>,
	state: tokio::sync::Mutex<SessionState>,
	closed: AtomicBool,
	refresher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionOperationQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionOperationQueue")
			.field("config", &self.config)
			.field("closed", &self.closed.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl SessionOperationQueue {
	/// Creates a queue without a refresh timer.
	pub fn new(config: SessionConfig, login: Arc<dyn LoginOperation>) -> Self {
		Self {
			config,
			login,
			state: tokio::sync::Mutex::new(SessionState::default()),
			closed: AtomicBool::new(false),
			refresher: Mutex::new(None),
		}
	}

	/// Creates a queue and spawns its refresh timer.
	///
	/// Must be called inside a tokio runtime.
	pub fn start(config: SessionConfig, login: Arc<dyn LoginOperation>) -> Arc<Self> {
		let every = config.refresh_interval;
		let queue = Arc::new(Self::new(config, login));
		if !every.is_zero() {
			*queue.refresher.lock() = Some(spawn_refresher(Arc::downgrade(&queue), every));
		}
		queue
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Runs `op` once the session is fresh, absorbing a single expiry.
	///
	/// On [`Error::SessionExpired`] the queue logs in and retries exactly once;
	/// whatever the retry returns is passed through. Other failures are not
	/// retried. If the freshness login fails the operation is never attempted.
	pub async fn run<O>(&self, op: &O) -> Result<O::Output>
	where
		O: RemoteOperation + ?Sized,
	{
		let mut state = self.acquire().await?;
		self.prepare(&mut state).await?;

		debug!(target = "longrun.session", operation = op.name(), "executing operation");
		let err = match op.execute().await {
			Ok(output) => return Ok(output),
			Err(err) => err,
		};

		if !err.is_session_expired() {
			self.after_failure(op, &err).await;
			return Err(err);
		}

		info!(target = "longrun.session", operation = op.name(), error = %err, "session expired; logging in and retrying");
		self.login_locked(&mut state).await?;
		match op.execute().await {
			Ok(output) => Ok(output),
			Err(err) => {
				self.after_failure(op, &err).await;
				Err(err)
			}
		}
	}

	/// One refresh tick: rotates if due, otherwise re-validates freshness,
	/// then counts the tick.
	pub async fn refresh(&self) -> Result<()> {
		let mut state = self.acquire().await?;
		self.prepare(&mut state).await?;
		state.refresh_counter += 1;
		debug!(target = "longrun.session", refresh_counter = state.refresh_counter, "session refreshed");
		Ok(())
	}

	/// Clears the session and logs in again, regardless of the counter.
	pub async fn force_rotation(&self) -> Result<()> {
		let mut state = self.acquire().await?;
		self.rotate(&mut state).await
	}

	pub async fn stats(&self) -> SessionStats {
		let state = self.state.lock().await;
		SessionStats {
			logins: state.logins,
			rotations: state.rotations,
			refresh_counter: state.refresh_counter,
			last_login_age: state.last_login.map(|at| at.elapsed()),
		}
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Stops the refresh timer. Pending and later calls fail with
	/// [`Error::ShutDown`]; a call already executing runs to completion.
	pub fn shutdown(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		if let Some(refresher) = self.refresher.lock().take() {
			refresher.abort();
		}
		info!(target = "longrun.session", "session queue shut down");
	}

	async fn acquire(&self) -> Result<MutexGuard<'_, SessionState>> {
		if self.is_closed() {
			return Err(Error::ShutDown);
		}
		let guard = self.state.lock().await;
		if self.is_closed() {
			return Err(Error::ShutDown);
		}
		Ok(guard)
	}

	/// Rotation when due, else a login if the session is missing or older than
	/// the refresh timeout.
	async fn prepare(&self, state: &mut SessionState) -> Result<()> {
		if state.refresh_counter >= self.config.max_refresh_count {
			return self.rotate(state).await;
		}
		let stale = match state.last_login {
			None => true,
			Some(at) => at.elapsed() > self.config.refresh_timeout,
		};
		if stale {
			self.login_locked(state).await?;
		}
		Ok(())
	}

	async fn rotate(&self, state: &mut SessionState) -> Result<()> {
		info!(
			target = "longrun.session",
			refresh_counter = state.refresh_counter,
			"rotating session"
		);
		if let Err(err) = self.login.clear_session().await {
			warn!(target = "longrun.session", error = %err, "failed to clear session before rotation");
		}
		self.login_locked(state).await?;
		state.refresh_counter = 0;
		state.rotations += 1;
		Ok(())
	}

	async fn login_locked(&self, state: &mut SessionState) -> Result<()> {
		match self.login.login().await {
			Ok(()) => {
				state.last_login = Some(Instant::now());
				state.logins += 1;
				debug!(target = "longrun.session", logins = state.logins, "logged in");
				Ok(())
			}
			Err(err) => {
				warn!(target = "longrun.session", error = %err, "login failed");
				Err(match err {
					Error::LoginFailed(_) => err,
					other => Error::LoginFailed(other.to_string()),
				})
			}
		}
	}

	async fn after_failure<O>(&self, op: &O, err: &Error)
	where
		O: RemoteOperation + ?Sized,
	{
		warn!(target = "longrun.session", operation = op.name(), error = %err, "operation failed");
		if op.page_kind() != PageKind::Dialog {
			return;
		}
		if let Err(dismiss) = self.login.dismiss_dialog().await {
			warn!(target = "longrun.session", operation = op.name(), error = %dismiss, "failed to dismiss dialog");
		}
	}
}

impl Drop for SessionOperationQueue {
	fn drop(&mut self) {
		if let Some(refresher) = self.refresher.get_mut().take() {
			refresher.abort();
		}
	}
}

fn spawn_refresher(queue: Weak<SessionOperationQueue>, every: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			let Some(queue) = queue.upgrade() else {
				break;
			};
			match queue.refresh().await {
				Ok(()) => {}
				Err(Error::ShutDown) => break,
				Err(err) => {
					warn!(target = "longrun.session", error = %err, "session refresh failed; retrying next interval");
				}
			}
		}
	})
}
