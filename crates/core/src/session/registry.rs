use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::config::SessionConfig;
use super::operation::LoginOperation;
use super::queue::SessionOperationQueue;

struct Entry {
	queue: Arc<SessionOperationQueue>,
	last_used: Instant,
}

/// Per-user cache of session queues, closed after `max_idle` without use.
pub struct SessionRegistry {
	config: SessionConfig,
	sessions: Mutex<HashMap<String, Entry>>,
	evictor: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRegistry {
	pub fn new(config: SessionConfig) -> Arc<Self> {
		Arc::new(Self {
			config,
			sessions: Mutex::new(HashMap::new()),
			evictor: Mutex::new(None),
		})
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Returns the queue for `user`, starting one if none is cached.
	///
	/// `make_login` is only called when a new queue is created, and runs
	/// without the registry lock held, so it may call back into the registry.
	pub fn get_or_create<F>(&self, user: &str, make_login: F) -> Arc<SessionOperationQueue>
	where
		F: FnOnce() -> Arc<dyn LoginOperation>,
	{
		if let Some(queue) = self.touch(user) {
			return queue;
		}

		let queue = SessionOperationQueue::start(self.config.clone(), make_login());
		let mut sessions = self.sessions.lock();
		if let Some(entry) = sessions.get_mut(user) {
			if !entry.queue.is_closed() {
				// Another caller started one while the login was being built.
				entry.last_used = Instant::now();
				let existing = Arc::clone(&entry.queue);
				drop(sessions);
				queue.shutdown();
				return existing;
			}
		}

		info!(target = "longrun.registry", user, "starting session");
		sessions.insert(
			user.to_string(),
			Entry {
				queue: Arc::clone(&queue),
				last_used: Instant::now(),
			},
		);
		queue
	}

	/// Open cached queue for `user`, marked as used.
	fn touch(&self, user: &str) -> Option<Arc<SessionOperationQueue>> {
		let mut sessions = self.sessions.lock();
		let entry = sessions.get_mut(user)?;
		if entry.queue.is_closed() {
			return None;
		}
		entry.last_used = Instant::now();
		Some(Arc::clone(&entry.queue))
	}

	/// Shuts down and drops queues idle for longer than `max_idle`.
	///
	/// Returns the evicted users.
	pub fn evict_idle(&self) -> Vec<String> {
		let now = Instant::now();
		let max_idle = self.config.max_idle;
		let mut evicted = Vec::new();
		self.sessions.lock().retain(|user, entry| {
			if now.saturating_duration_since(entry.last_used) <= max_idle {
				return true;
			}
			entry.queue.shutdown();
			evicted.push(user.clone());
			false
		});
		evicted.sort();
		if !evicted.is_empty() {
			info!(target = "longrun.registry", evicted = ?evicted, "closed idle sessions");
		}
		evicted
	}

	/// Runs [`evict_idle`](Self::evict_idle) every `interval`, replacing any
	/// previous timer.
	pub fn start_eviction(self: &Arc<Self>, interval: Duration) {
		if interval.is_zero() {
			return;
		}
		let handle = spawn_evictor(Arc::downgrade(self), interval);
		if let Some(previous) = self.evictor.lock().replace(handle) {
			previous.abort();
		}
	}

	/// Sorted users with a cached queue.
	pub fn users(&self) -> Vec<String> {
		let mut users: Vec<String> = self.sessions.lock().keys().cloned().collect();
		users.sort();
		users
	}

	/// Stops the eviction timer and shuts down every cached queue.
	pub fn close_all(&self) {
		if let Some(evictor) = self.evictor.lock().take() {
			evictor.abort();
		}
		let drained: Vec<(String, Entry)> = self.sessions.lock().drain().collect();
		for (user, entry) in drained {
			debug!(target = "longrun.registry", user = %user, "closing session");
			entry.queue.shutdown();
		}
	}
}

impl Drop for SessionRegistry {
	fn drop(&mut self) {
		if let Some(evictor) = self.evictor.get_mut().take() {
			evictor.abort();
		}
	}
}

fn spawn_evictor(registry: Weak<SessionRegistry>, every: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			let Some(registry) = registry.upgrade() else {
				break;
			};
			registry.evict_idle();
		}
	})
}
