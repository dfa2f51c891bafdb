//! Collaborator traits the session queue drives.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;

/// What the remote page looks like while an operation runs.
///
/// Dialog pages leave a modal open on failure, which must be dismissed before
/// the session can serve the next operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageKind {
	#[default]
	Plain,
	Dialog,
}

/// Unit of remote work executed through a session queue.
///
/// `execute` may be called twice for one queued call: once, and again after a
/// re-login if the first attempt reported [`Error::SessionExpired`].
///
/// [`Error::SessionExpired`]: crate::Error::SessionExpired
#[async_trait]
pub trait RemoteOperation: Send + Sync {
	type Output: Send;

	async fn execute(&self) -> Result<Self::Output>;

	/// Short label used in log lines.
	fn name(&self) -> &str;

	fn page_kind(&self) -> PageKind {
		PageKind::Plain
	}
}

/// Authentication collaborator of a session queue.
#[async_trait]
pub trait LoginOperation: Send + Sync {
	/// Establishes or refreshes the session. Must be idempotent.
	async fn login(&self) -> Result<()>;

	/// Drops cookies and storage ahead of a forced rotation.
	async fn clear_session(&self) -> Result<()>;

	/// Closes a modal left open by a failed dialog operation.
	async fn dismiss_dialog(&self) -> Result<()> {
		Ok(())
	}
}

/// [`RemoteOperation`] backed by a closure; see [`operation`].
pub struct FnOperation<F> {
	name: String,
	kind: PageKind,
	run: F,
}

impl<F> fmt::Debug for FnOperation<F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnOperation")
			.field("name", &self.name)
			.field("kind", &self.kind)
			.finish_non_exhaustive()
	}
}

#[async_trait]
impl<F, Fut, T> RemoteOperation for FnOperation<F>
where
	F: Fn() -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<T>> + Send + 'static,
	T: Send + 'static,
{
	type Output = T;

	async fn execute(&self) -> Result<T> {
		(self.run)().await
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn page_kind(&self) -> PageKind {
		self.kind
	}
}

/// Wraps a closure returning a future as a [`RemoteOperation`].
///
/// The closure is called once per attempt, so it must rebuild its future from
/// captured state rather than consume it.
pub fn operation<F, Fut, T>(name: impl Into<String>, kind: PageKind, run: F) -> FnOperation<F>
where
	F: Fn() -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<T>> + Send + 'static,
	T: Send + 'static,
{
	FnOperation {
		name: name.into(),
		kind,
		run,
	}
}
