use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::handlers::{BatchHandler, ResultMap};
use crate::runtime::task::{Task, TaskId};

pub const SIMPLE_HANDLER: &str = "simple";

/// Baseline handler for [`SimpleTask`](crate::SimpleTask): invokes each
/// task's thunk independently. Registered automatically by
/// [`Scheduler::new`](crate::Scheduler::new).
#[derive(Debug)]
pub struct SimpleHandler;

impl BatchHandler for SimpleHandler {
    fn name(&self) -> &str {
        SIMPLE_HANDLER
    }

    fn execute_batch(
        &self,
        _batch_key: &str,
        tasks: BTreeMap<TaskId, Task>,
        out: &mut ResultMap,
    ) -> Result<()> {
        for (id, task) in tasks {
            match task {
                Task::Simple(simple) => {
                    out.insert(id, simple.run());
                }
                other => bail!("Simple handler cannot execute {} task", other.kind()),
            }
        }
        Ok(())
    }
}

/// Adapter wrapping a closure as a [`BatchHandler`].
pub struct FnHandler<F> {
    name: String,
    batch_fn: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&str, BTreeMap<TaskId, Task>, &mut ResultMap) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, batch_fn: F) -> Self {
        Self {
            name: name.into(),
            batch_fn,
        }
    }
}

impl<F> BatchHandler for FnHandler<F>
where
    F: Fn(&str, BTreeMap<TaskId, Task>, &mut ResultMap) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute_batch(
        &self,
        batch_key: &str,
        tasks: BTreeMap<TaskId, Task>,
        out: &mut ResultMap,
    ) -> Result<()> {
        (self.batch_fn)(batch_key, tasks, out)
    }
}
