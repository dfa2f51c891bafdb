//! Error taxonomy shared by the scheduler and the session queue.

use thiserror::Error;

use crate::identity::TaskId;

/// Result type alias for scheduler and session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP status code class attached to [`Error::Cancelled`] and [`Error::ShutDown`].
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// Errors produced by tasks, the scheduler, and the session queue.
///
/// Errors are `Clone` because a stored failure can be fetched any number of
/// times during the retention window.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// The task observed a cancellation request and aborted.
	#[error("{message}")]
	Cancelled { message: String },

	/// The remote session is gone and a fresh login is required.
	///
	/// The session queue retries exactly once after re-login; only a second
	/// expiry reaches the caller.
	#[error("Session has expired: {0}")]
	SessionExpired(String),

	/// Any other remote failure, passed through verbatim.
	#[error("{message}")]
	OperationFailed {
		message: String,
		/// Status the remote side suggested, if any.
		status: Option<u16>,
	},

	/// The login collaborator failed while refreshing the session.
	#[error("Login failed: {0}")]
	LoginFailed(String),

	/// Unique id generation kept colliding; indicates a defect, not load.
	#[error("Failed to create a unique task id after {attempts} attempts (last: {last})")]
	IdentityExhausted { attempts: usize, last: String },

	/// No task with this id is known, or it has not finished yet.
	#[error("Task not found: {0}")]
	NotFound(TaskId),

	/// The task has already finished.
	#[error("Task has finished: {0}")]
	Conflict(TaskId),

	/// The scheduler or session queue has been shut down.
	#[error("Service is shutting down")]
	ShutDown,
}

impl Error {
	/// Creates a [`Error::OperationFailed`] without a status hint.
	pub fn operation_failed(message: impl Into<String>) -> Self {
		Error::OperationFailed {
			message: message.into(),
			status: None,
		}
	}

	/// Creates a [`Error::OperationFailed`] carrying an explicit status.
	pub fn operation_failed_with_status(message: impl Into<String>, status: u16) -> Self {
		Error::OperationFailed {
			message: message.into(),
			status: Some(status),
		}
	}

	/// HTTP status code this error maps to.
	pub fn status_code(&self) -> u16 {
		match self {
			Error::Cancelled { .. } | Error::ShutDown => STATUS_SERVICE_UNAVAILABLE,
			Error::SessionExpired(_) => 401,
			Error::OperationFailed { status, .. } => status.unwrap_or(500),
			Error::LoginFailed(_) => 502,
			Error::IdentityExhausted { .. } => 500,
			Error::NotFound(_) => 404,
			Error::Conflict(_) => 409,
		}
	}

	/// Returns true if this failure should trigger a re-login.
	pub fn is_session_expired(&self) -> bool {
		matches!(self, Error::SessionExpired(_))
	}

	/// Returns true if this is a cancellation.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled { .. })
	}

	/// Returns true if resubmitting the same work later may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Error::Cancelled { .. } | Error::SessionExpired(_) | Error::LoginFailed(_) | Error::ShutDown
		)
	}
}
