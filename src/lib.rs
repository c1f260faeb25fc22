//! Deferred task batching and coalescing engine.
//!
//! Callers describe work as [`Task`] values, compose them into a
//! [`MultiTask`], and hand the tree to a [`Scheduler`], which executes it
//! in the minimum number of batch calls: leaves are grouped by
//! `(handler, batch_key)`, identical requests are coalesced by `task_key`,
//! and sequence continuations are threaded through successive phases.

pub mod handlers;
pub mod runtime;
pub mod tasks;

pub use handlers::builtin::{FnHandler, SimpleHandler};
pub use handlers::{BatchHandler, ResultMap};
pub use runtime::scheduler::{PlannedBatch, Scheduler};
pub use runtime::skeleton::ResultTree;
pub use runtime::task::{BatchKeys, Progression, Task, TaskId, DEFAULT_BATCH_KEY};
pub use tasks::{CallTask, MultiTask, SequenceTask, SimpleTask};
