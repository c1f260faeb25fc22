use anyhow::{anyhow, Result};

use crate::runtime::scheduler::{PlannedBatch, Scheduler};
use crate::runtime::skeleton::ResultTree;
use crate::runtime::task::Task;

/// A caller-keyed collection of subtasks.
///
/// Caller keys label slots in the result tree and play no part in batching.
/// Subtasks may be any kind, including nested multi-tasks and sequences.
#[derive(Debug, Default)]
pub struct MultiTask {
    entries: Vec<(String, Task)>,
}

impl MultiTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subtask under a caller key. Keys must be unique.
    pub fn insert(&mut self, key: impl Into<String>, task: impl Into<Task>) -> Result<()> {
        let key = key.into();
        if self.entries.iter().any(|(existing, _)| *existing == key) {
            return Err(anyhow!("Duplicate caller key: {}", key));
        }
        self.entries.push((key, task.into()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the batching scheduler over this tree.
    pub fn execute(self, scheduler: &Scheduler) -> Result<ResultTree> {
        scheduler.run(self)
    }

    /// The batches the first phase would dispatch, without executing them.
    pub fn batches_for_debugging(self, scheduler: &Scheduler) -> Result<Vec<PlannedBatch>> {
        scheduler.debug_batches(self)
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Task)> {
        self.entries
    }
}
