//! Task status, listing, and error bodies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle stage reported for a deferred task.
///
/// `Queued` is only ever returned by a submission and `Cancelled` only by a
/// cancellation request; neither is a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
	Queued,
	Waiting,
	Running,
	Cancelled,
	Finished,
	Failed,
}

impl TaskStatus {
	/// Wire spelling of the status.
	pub fn as_str(self) -> &'static str {
		match self {
			TaskStatus::Queued => "QUEUED",
			TaskStatus::Waiting => "WAITING",
			TaskStatus::Running => "RUNNING",
			TaskStatus::Cancelled => "CANCELLED",
			TaskStatus::Finished => "FINISHED",
			TaskStatus::Failed => "FAILED",
		}
	}

	/// Returns true once the task has left the running set.
	pub fn is_terminal(self) -> bool {
		matches!(self, TaskStatus::Finished | TaskStatus::Failed)
	}
}

impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Body returned by submission, status, and cancellation endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusMessage {
	pub status: TaskStatus,
	/// Human-readable description of the status.
	pub message: String,
	pub task_id: String,
	/// Progress in permille (0..=1000) as last reported by the task.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub progress: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub progress_message: Option<String>,
}

impl TaskStatusMessage {
	pub fn new(status: TaskStatus, message: impl Into<String>, task_id: impl Into<String>) -> Self {
		Self {
			status,
			message: message.into(),
			task_id: task_id.into(),
			progress: None,
			progress_message: None,
		}
	}

	pub fn with_progress(mut self, progress: u32, progress_message: Option<String>) -> Self {
		self.progress = Some(progress);
		self.progress_message = progress_message;
		self
	}
}

/// Identifiers of all tasks the scheduler currently knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListing {
	/// Tasks still waiting or running.
	pub queued_tasks: Vec<String>,
	/// Tasks whose results are retained for fetching.
	pub finished_tasks: Vec<String>,
}

/// Error body, `error` mirrors the HTTP status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
	pub error: u16,
	pub message: String,
}

impl ErrorMessage {
	pub fn new(error: u16, message: impl Into<String>) -> Self {
		Self {
			error,
			message: message.into(),
		}
	}
}
