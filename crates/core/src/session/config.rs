use std::time::Duration;

/// Timing knobs for a [`SessionOperationQueue`](super::SessionOperationQueue)
/// and the [`SessionRegistry`](super::SessionRegistry) that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
	/// A session older than this is re-validated before the next operation.
	pub refresh_timeout: Duration,
	/// Period of the background refresh tick; zero disables the timer.
	pub refresh_interval: Duration,
	/// Refresh ticks after which the next unit forces a full rotation.
	pub max_refresh_count: u32,
	/// Registry entries unused for longer than this are closed.
	pub max_idle: Duration,
	/// Period of the registry's idle sweep.
	pub eviction_interval: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			refresh_timeout: Duration::from_secs(5 * 60),
			refresh_interval: Duration::from_secs(5 * 60),
			max_refresh_count: 20,
			max_idle: Duration::from_secs(2 * 60 * 60),
			eviction_interval: Duration::from_secs(15 * 60),
		}
	}
}

impl SessionConfig {
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = timeout;
		self
	}

	pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
		self.refresh_interval = interval;
		self
	}

	pub fn with_max_refresh_count(mut self, count: u32) -> Self {
		self.max_refresh_count = count;
		self
	}

	pub fn with_max_idle(mut self, idle: Duration) -> Self {
		self.max_idle = idle;
		self
	}
}
