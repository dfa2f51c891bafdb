//! Task identities and collision-avoiding allocation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of attempts before giving up on a unique id.
pub const DEFAULT_MAX_ID_ATTEMPTS: usize = 10;

/// Opaque unique identifier of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
	/// Generates a random id. The `i` prefix keeps ids usable as identifiers.
	pub fn random() -> Self {
		TaskId(format!("i{}", uuid::Uuid::new_v4()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for TaskId {
	fn from(value: String) -> Self {
		TaskId(value)
	}
}

impl From<&str> for TaskId {
	fn from(value: &str) -> Self {
		TaskId(value.to_string())
	}
}

impl AsRef<str> for TaskId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Source of candidate ids; [`TaskId::random`] unless overridden in tests.
pub type IdSource = Arc<dyn Fn() -> TaskId + Send + Sync>;

/// Returns the default random id source.
pub fn random_ids() -> IdSource {
	Arc::new(TaskId::random)
}

/// Draws ids from `source` until one is not `taken`.
///
/// Fails with [`Error::IdentityExhausted`] after `max_attempts` collisions.
pub fn allocate(source: &IdSource, max_attempts: usize, taken: impl Fn(&TaskId) -> bool) -> Result<TaskId> {
	let attempts = max_attempts.max(1);
	let mut candidate = source();
	for _ in 1..attempts {
		if !taken(&candidate) {
			return Ok(candidate);
		}
		candidate = source();
	}

	if taken(&candidate) {
		return Err(Error::IdentityExhausted {
			attempts,
			last: candidate.0,
		});
	}
	Ok(candidate)
}
