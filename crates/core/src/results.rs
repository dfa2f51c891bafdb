//! Time-bounded retention of finished task outcomes.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::identity::TaskId;
use crate::task::ResultProducer;

/// How long finished results stay fetchable by default.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Retained outcome of a finished task.
#[derive(Debug, Clone)]
pub struct OperationResult {
	pub created_at: Instant,
	pub producer: ResultProducer,
	pub failed: bool,
}

/// Finished outcomes keyed by task id, evicted after `retention`.
#[derive(Debug)]
pub struct ResultStore {
	entries: HashMap<TaskId, OperationResult>,
	retention: Duration,
}

impl ResultStore {
	pub fn new(retention: Duration) -> Self {
		Self {
			entries: HashMap::new(),
			retention,
		}
	}

	pub fn retention(&self) -> Duration {
		self.retention
	}

	/// Stores a finished outcome stamped with the current time.
	pub fn insert(&mut self, id: TaskId, producer: ResultProducer, failed: bool) {
		self.entries.insert(
			id,
			OperationResult {
				created_at: Instant::now(),
				producer,
				failed,
			},
		);
	}

	pub fn get(&self, id: &TaskId) -> Option<&OperationResult> {
		self.entries.get(id)
	}

	pub fn contains(&self, id: &TaskId) -> bool {
		self.entries.contains_key(id)
	}

	/// Sorted ids of all retained results.
	pub fn ids(&self) -> Vec<TaskId> {
		let mut ids: Vec<TaskId> = self.entries.keys().cloned().collect();
		ids.sort();
		ids
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Removes entries older than the retention window, returning how many.
	pub fn sweep(&mut self, now: Instant) -> usize {
		let before = self.entries.len();
		let retention = self.retention;
		self.entries
			.retain(|_, result| now.saturating_duration_since(result.created_at) <= retention);
		before - self.entries.len()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}
