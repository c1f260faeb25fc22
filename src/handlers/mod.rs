use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use serde_json::Value;

use crate::runtime::task::{Task, TaskId};

pub mod builtin;

/// Result sink a handler writes into during a batch call.
pub type ResultMap = HashMap<TaskId, Value>;

/// Executes a bulk of same-kind tasks.
///
/// Handlers are registered on a [`Scheduler`](crate::Scheduler) under their
/// `name()` and receive one call per `(handler, batch_key)` group per phase.
/// A handler must write a result for every input task id; business-level
/// failures are encoded in the result value, not returned as `Err`. A
/// returned `Err` aborts the whole run.
pub trait BatchHandler: Send + Sync {
    fn name(&self) -> &str;

    fn execute_batch(
        &self,
        batch_key: &str,
        tasks: BTreeMap<TaskId, Task>,
        out: &mut ResultMap,
    ) -> Result<()>;
}
