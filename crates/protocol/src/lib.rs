//! Wire types for the long-running task API.
//!
//! Types in this crate are the shapes of JSON bodies exchanged with HTTP
//! clients polling deferred tasks. They carry no behavior beyond
//! serialization; the scheduler that produces them lives in `pw-longrun`.

pub mod submit;
pub mod task;

pub use submit::*;
pub use task::*;
