use std::time::Duration;

use crate::identity::DEFAULT_MAX_ID_ATTEMPTS;
use crate::results::DEFAULT_RETENTION;

/// Number of tasks allowed to run at once by default.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Tuning for a [`TaskScheduler`](super::TaskScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
	/// Tasks allowed in flight simultaneously; at least 1.
	pub concurrency: usize,
	/// How long finished results remain fetchable.
	pub retention: Duration,
	/// Interval of the background sweeper; `None` sweeps only on submit/finish.
	pub sweep_interval: Option<Duration>,
	/// Attempts at generating a non-colliding id before failing.
	pub max_id_attempts: usize,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			concurrency: DEFAULT_CONCURRENCY,
			retention: DEFAULT_RETENTION,
			sweep_interval: Some(Duration::from_secs(60)),
			max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
		}
	}
}

impl SchedulerConfig {
	pub fn with_concurrency(mut self, concurrency: usize) -> Self {
		self.concurrency = concurrency;
		self
	}

	pub fn with_retention(mut self, retention: Duration) -> Self {
		self.retention = retention;
		self
	}

	pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
		self.sweep_interval = interval;
		self
	}
}
