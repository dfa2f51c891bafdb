//! Deferred task execution in front of slow, single-session remote targets.
//!
//! Two independent pieces:
//!
//! - [`TaskScheduler`] turns a long-running unit of work into a task id that
//!   callers poll, fetch and cancel. Tasks run on a bounded number of slots,
//!   may chain on another task, and keep their outcome for a retention window.
//! - [`SessionOperationQueue`] serializes [`RemoteOperation`]s against one
//!   remote session, logging in when the session is stale, retrying once on
//!   expiry and rotating the session on a schedule.
//!
//! ```ignore
//! let scheduler = TaskScheduler::new(SchedulerConfig::default());
//! let session = SessionOperationQueue::start(SessionConfig::default(), login);
//!
//! let id = scheduler.submit(
//!     task(move |control| async move {
//!         let order = session.run(&read_order).await?;
//!         let order = control.check_and_pass(order)?;
//!         Ok(ResultProducer::json(order))
//!     }),
//!     None,
//! )?;
//! ```

pub mod control;
pub mod error;
pub mod identity;
pub mod results;
pub mod scheduler;
pub mod session;
pub mod task;

pub use control::{PROGRESS_COMPLETE, TaskControl};
pub use error::{Error, Result};
pub use identity::TaskId;
pub use scheduler::{CancelOutcome, SchedulerConfig, Submission, SubmitOptions, TaskReport, TaskScheduler};
pub use session::{
	LoginOperation, PageKind, RemoteOperation, SessionConfig, SessionOperationQueue, SessionRegistry, SessionStats,
	operation,
};
pub use task::{OutputSink, ResultProducer, Task, task};
