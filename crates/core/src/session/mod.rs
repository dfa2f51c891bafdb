//! Single-flight access to one remote session.
//!
//! The remote target tolerates one in-flight operation per session and drops
//! sessions without notice. [`SessionOperationQueue`] serializes every call,
//! keeps the session fresh, re-logs in once on expiry and periodically
//! rotates the session. [`SessionRegistry`] caches one queue per user.

mod config;
mod operation;
mod queue;
mod registry;

pub use config::SessionConfig;
pub use operation::{FnOperation, LoginOperation, PageKind, RemoteOperation, operation};
pub use queue::{SessionOperationQueue, SessionStats};
pub use registry::SessionRegistry;
