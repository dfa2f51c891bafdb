//! Deferred tasks and the producers that render their outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::control::TaskControl;
use crate::error::{Error, Result};

/// Destination a [`ResultProducer`] writes into, typically an HTTP response.
pub trait OutputSink {
	fn success(&mut self, payload: Value);
	fn failure(&mut self, error: &Error);
}

/// Captures whatever was emitted; used by [`ResultProducer::outcome`].
#[derive(Debug, Default)]
pub struct CapturedOutput(Option<Result<Value>>);

impl CapturedOutput {
	pub fn into_inner(self) -> Option<Result<Value>> {
		self.0
	}
}

impl OutputSink for CapturedOutput {
	fn success(&mut self, payload: Value) {
		self.0 = Some(Ok(payload));
	}

	fn failure(&mut self, error: &Error) {
		self.0 = Some(Err(error.clone()));
	}
}

type ProduceFn = Arc<dyn Fn(&mut dyn OutputSink) + Send + Sync>;

/// Deferred rendering of a task outcome.
///
/// A producer may be invoked any number of times; each fetch of a retained
/// result feeds it a fresh sink.
#[derive(Clone)]
pub struct ResultProducer {
	produce: ProduceFn,
}

impl ResultProducer {
	/// Producer emitting a fixed success payload.
	pub fn json(payload: Value) -> Self {
		Self::from_fn(move |sink| sink.success(payload.clone()))
	}

	/// Producer emitting a fixed failure.
	pub fn failure(error: Error) -> Self {
		Self::from_fn(move |sink| sink.failure(&error))
	}

	/// Producer backed by an arbitrary emitter.
	pub fn from_fn<F>(produce: F) -> Self
	where
		F: Fn(&mut dyn OutputSink) + Send + Sync + 'static,
	{
		Self {
			produce: Arc::new(produce),
		}
	}

	pub fn produce(&self, sink: &mut dyn OutputSink) {
		(self.produce)(sink)
	}

	/// Runs the producer against a [`CapturedOutput`].
	///
	/// A producer that emits nothing yields `Value::Null`.
	pub fn outcome(&self) -> Result<Value> {
		let mut captured = CapturedOutput::default();
		self.produce(&mut captured);
		captured.into_inner().unwrap_or(Ok(Value::Null))
	}
}

impl fmt::Debug for ResultProducer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResultProducer").finish_non_exhaustive()
	}
}

/// Boxed future returned by a [`Task`].
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<ResultProducer>> + Send>>;

/// Deferred unit of work accepted by the scheduler.
pub type Task = Box<dyn FnOnce(TaskControl) -> TaskFuture + Send>;

/// Wraps an async closure as a [`Task`].
pub fn task<F, Fut>(body: F) -> Task
where
	F: FnOnce(TaskControl) -> Fut + Send + 'static,
	Fut: Future<Output = Result<ResultProducer>> + Send + 'static,
{
	Box::new(move |control| Box::pin(body(control)))
}
