use std::fmt::{self, Debug, Display, Formatter};

use anyhow::Result;
use serde_json::Value;

use crate::runtime::scheduler::Scheduler;
use crate::tasks::{CallTask, MultiTask, SequenceTask, SimpleTask};

pub const DEFAULT_BATCH_KEY: &str = "default";

/// Identity of a task within one scheduler run. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three batching keys of a task.
///
/// Tasks sharing `(handler, batch_key)` are dispatched in one call; tasks
/// that also share a `task_key` are executed at most once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchKeys {
    pub handler: String,
    pub batch_key: String,
    pub task_key: Option<String>,
}

impl BatchKeys {
    fn kind_default(kind: &str) -> Self {
        Self {
            handler: kind.to_string(),
            batch_key: DEFAULT_BATCH_KEY.to_string(),
            task_key: None,
        }
    }
}

/// Continuation attached to a sequence: maps the base result to the next
/// task, or `None` to end the chain.
pub type Progression = Box<dyn FnOnce(Value) -> Option<Task> + Send>;

/// A unit of deferred work.
///
/// `Simple` and `Call` are leaves handed to handlers in batches. `Sequence`
/// and `Multi` are composite kinds the scheduler takes apart; they never
/// reach a handler themselves.
pub enum Task {
    Simple(SimpleTask),
    Call(CallTask),
    Sequence(Box<SequenceTask>),
    Multi(MultiTask),
}

impl Task {
    pub fn simple(thunk: impl FnOnce() -> Value + Send + 'static) -> Self {
        Task::Simple(SimpleTask::new(thunk))
    }

    pub fn sequence(
        base: Task,
        progression: impl FnOnce(Value) -> Option<Task> + Send + 'static,
    ) -> Self {
        Task::Sequence(Box::new(SequenceTask::new(base, progression)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Task::Simple(_) => "simple",
            Task::Call(_) => "call",
            Task::Sequence(_) => "sequence",
            Task::Multi(_) => "multi",
        }
    }

    /// `(handler, batch_key, task_key)` for this task. Composite kinds
    /// report their kind name; the scheduler never batches them.
    pub fn batching_keys(&self) -> BatchKeys {
        match self {
            Task::Simple(_) => BatchKeys::kind_default(crate::handlers::builtin::SIMPLE_HANDLER),
            Task::Call(call) => call.keys(),
            Task::Sequence(_) => BatchKeys::kind_default("sequence"),
            Task::Multi(_) => BatchKeys::kind_default("multi"),
        }
    }

    /// Convenience single-task execution, equivalent to a batch of one.
    pub fn execute(self, scheduler: &Scheduler) -> Result<Value> {
        scheduler.run_task(self)
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Task::Simple(task) => Debug::fmt(task, f),
            Task::Call(task) => Debug::fmt(task, f),
            Task::Sequence(task) => Debug::fmt(task, f),
            Task::Multi(task) => Debug::fmt(task, f),
        }
    }
}

impl From<SimpleTask> for Task {
    fn from(task: SimpleTask) -> Self {
        Task::Simple(task)
    }
}

impl From<CallTask> for Task {
    fn from(task: CallTask) -> Self {
        Task::Call(task)
    }
}

impl From<SequenceTask> for Task {
    fn from(task: SequenceTask) -> Self {
        Task::Sequence(Box::new(task))
    }
}

impl From<MultiTask> for Task {
    fn from(task: MultiTask) -> Self {
        Task::Multi(task)
    }
}
