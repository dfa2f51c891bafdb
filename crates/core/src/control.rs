//! Per-task progress reporting and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Progress value meaning "100 %".
pub const PROGRESS_COMPLETE: u32 = 1000;

const DEFAULT_CANCEL_MESSAGE: &str = "Task cancelled";

/// Handle given to every task for progress reporting and cancellation checks.
///
/// Cloning yields another handle to the same control block. Cancellation is
/// advisory: nothing interrupts the task, it is expected to call
/// [`check_and_pass`](Self::check_and_pass) between steps.
#[derive(Debug, Clone, Default)]
pub struct TaskControl {
	inner: Arc<ControlBlock>,
}

#[derive(Debug, Default)]
struct ControlBlock {
	progress: AtomicU32,
	progress_message: Mutex<Option<String>>,
	cancelled: AtomicBool,
}

/// Point-in-time copy of a [`TaskControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSnapshot {
	pub progress: u32,
	pub progress_message: Option<String>,
	pub cancelled: bool,
}

impl TaskControl {
	pub fn new() -> Self {
		Self::default()
	}

	/// Progress in permille. Values outside 0..=1000 are stored as given.
	pub fn progress(&self) -> u32 {
		self.inner.progress.load(Ordering::Acquire)
	}

	pub fn set_progress(&self, progress: u32) {
		self.inner.progress.store(progress, Ordering::Release);
	}

	pub fn progress_message(&self) -> Option<String> {
		self.inner.progress_message.lock().clone()
	}

	/// Replaces the previous progress message.
	pub fn set_progress_message(&self, message: impl Into<String>) {
		*self.inner.progress_message.lock() = Some(message.into());
	}

	pub fn is_cancelled(&self) -> bool {
		self.inner.cancelled.load(Ordering::Acquire)
	}

	/// Flags the task as cancelled. Never reverts.
	pub(crate) fn cancel(&self) {
		self.inner.cancelled.store(true, Ordering::Release);
	}

	/// Passes `value` through unless cancellation was requested.
	///
	/// ```ignore
	/// let page = control.check_and_pass(open_page().await?)?;
	/// control.set_progress(500);
	/// let order = control.check_and_pass(read_order(&page).await?)?;
	/// ```
	pub fn check_and_pass<T>(&self, value: T) -> Result<T> {
		if self.is_cancelled() {
			Err(self.create_cancel_error(None))
		} else {
			Ok(value)
		}
	}

	/// Builds the error a task returns once it notices cancellation.
	pub fn create_cancel_error(&self, message: Option<&str>) -> Error {
		Error::Cancelled {
			message: message.unwrap_or(DEFAULT_CANCEL_MESSAGE).to_string(),
		}
	}

	pub fn snapshot(&self) -> ControlSnapshot {
		ControlSnapshot {
			progress: self.progress(),
			progress_message: self.progress_message(),
			cancelled: self.is_cancelled(),
		}
	}
}
