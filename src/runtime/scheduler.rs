use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::handlers::builtin::{FnHandler, SimpleHandler};
use crate::handlers::{BatchHandler, ResultMap};
use crate::runtime::skeleton::{ResultTree, Skeleton, SkeletonNode};
use crate::runtime::task::{Progression, Task, TaskId};
use crate::tasks::{MultiTask, SequenceTask};

/// One batch the first phase would dispatch, as reported by
/// [`Scheduler::debug_batches`].
#[derive(Debug)]
pub struct PlannedBatch {
    pub handler: String,
    pub batch_key: String,
    pub tasks: BTreeMap<TaskId, Task>,
}

/// The batching engine.
///
/// Holds the handler registry; all per-run state lives in a private run
/// value owned by a single invocation, so a `Scheduler` can be shared and
/// reused across runs and threads.
pub struct Scheduler {
    handlers: DashMap<String, Arc<dyn BatchHandler>>,
    max_phases: Option<usize>,
}

impl Scheduler {
    pub fn new() -> Self {
        let scheduler = Self {
            handlers: DashMap::new(),
            max_phases: None,
        };
        scheduler.register(Arc::new(SimpleHandler));
        scheduler
    }

    /// Abort a run after this many phases. A progression that keeps
    /// returning another sequence would otherwise loop forever.
    pub fn with_max_phases(mut self, max_phases: usize) -> Self {
        self.max_phases = Some(max_phases);
        self
    }

    pub fn register(&self, handler: Arc<dyn BatchHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Register a closure as a batch handler.
    pub fn register_fn<F>(&self, name: impl Into<String>, batch_fn: F)
    where
        F: Fn(&str, BTreeMap<TaskId, Task>, &mut ResultMap) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnHandler::new(name, batch_fn)));
    }

    fn handler(&self, name: &str) -> Result<Arc<dyn BatchHandler>> {
        self.handlers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| anyhow!("Handler not found: {}", name))
    }

    /// Execute a multi-task tree in the minimum number of batch calls and
    /// return a result tree of the same shape.
    pub fn run(&self, multi: MultiTask) -> Result<ResultTree> {
        let mut run = Run::new(self);
        debug!(run = %run.run_id, subtasks = multi.len(), "Starting scheduler run");
        run.schedule_multi(multi, run.root)?;
        run.execute()?;
        Ok(run.into_response())
    }

    /// Execute one task outside a multi-task, as a synthetic batch of one.
    ///
    /// Sequences fall back to step-at-a-time execution; a multi-task is not
    /// executable this way and must go through [`run`](Self::run).
    pub fn run_task(&self, task: Task) -> Result<Value> {
        let mut current = task;
        loop {
            match current {
                Task::Multi(_) => {
                    bail!("Multi-task is not directly executable, submit it via run()")
                }
                Task::Sequence(sequence) => {
                    let (base, progression) = sequence.into_parts();
                    let value = self.run_task(base)?;
                    match progression(value) {
                        Some(next) => current = next,
                        None => return Ok(Value::Null),
                    }
                }
                leaf => {
                    let keys = leaf.batching_keys();
                    let handler = self.handler(&keys.handler)?;
                    let id = TaskId(1);
                    let mut tasks = BTreeMap::new();
                    tasks.insert(id, leaf);
                    let mut out = ResultMap::new();
                    handler.execute_batch(&keys.batch_key, tasks, &mut out)?;
                    return Ok(out.remove(&id).unwrap_or(Value::Null));
                }
            }
        }
    }

    /// The batches the first phase would dispatch, without executing them.
    pub fn debug_batches(&self, multi: MultiTask) -> Result<Vec<PlannedBatch>> {
        let mut run = Run::new(self);
        run.schedule_multi(multi, run.root)?;
        Ok(run
            .batches
            .into_iter()
            .map(|((handler, batch_key), tasks)| PlannedBatch {
                handler,
                batch_key,
                tasks,
            })
            .collect())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

type GroupKey = (String, String);
type DedupKey = (String, String, String);

/// State of one scheduler invocation.
struct Run<'s> {
    scheduler: &'s Scheduler,
    run_id: Uuid,
    /// Current phase's pending work, one entry per `(handler, batch_key)`.
    batches: BTreeMap<GroupKey, BTreeMap<TaskId, Task>>,
    /// Cross-phase dedup table; never cleared during a run.
    ids_by_key: HashMap<DedupKey, TaskId>,
    /// Continuations staged for the end of the current phase, each with the
    /// skeleton slot it rewrites.
    progressions: Vec<(TaskId, usize, Progression)>,
    /// Sequence ids whose base coalesced with a previously scheduled id.
    aliases: HashMap<TaskId, TaskId>,
    /// One entry per task id ever dispatched; entries are never overwritten.
    results: HashMap<TaskId, Value>,
    skeleton: Skeleton,
    root: usize,
    next_id: u64,
}

impl<'s> Run<'s> {
    fn new(scheduler: &'s Scheduler) -> Self {
        let mut skeleton = Skeleton::new();
        let root = skeleton.push(SkeletonNode::Branch(Vec::new()));
        Self {
            scheduler,
            run_id: Uuid::new_v4(),
            batches: BTreeMap::new(),
            ids_by_key: HashMap::new(),
            progressions: Vec::new(),
            aliases: HashMap::new(),
            results: HashMap::new(),
            skeleton,
            root,
            next_id: 0,
        }
    }

    fn fresh_id(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }

    /// Give every subtask its own skeleton slot and schedule it.
    fn schedule_multi(&mut self, multi: MultiTask, slot: usize) -> Result<()> {
        let mut children = Vec::new();
        for (key, task) in multi.into_entries() {
            let child = self.skeleton.push(SkeletonNode::Resolved(Value::Null));
            children.push((key, child));
            self.schedule(task, child)?;
        }
        self.skeleton.set(slot, SkeletonNode::Branch(children));
        Ok(())
    }

    /// Flatten one subtask into the current phase's batches.
    ///
    /// Sequence layers are peeled off and folded into a single continuation
    /// registered under the task id allocated here; the slot tracks where
    /// the chain's ultimate result must land. Leaves are grouped by
    /// `(handler, batch_key)` and deduplicated by `task_key` against every
    /// phase scheduled so far.
    fn schedule(&mut self, task: Task, slot: usize) -> Result<()> {
        let id = self.fresh_id();
        let mut task = task;
        let mut progression: Option<Progression> = None;
        loop {
            match task {
                Task::Sequence(sequence) => {
                    let (base, inner) = sequence.into_parts();
                    // A nested base re-nests so inner steps settle before
                    // outer continuations run.
                    progression = Some(match progression {
                        None => inner,
                        Some(outer) => chain(inner, outer),
                    });
                    task = base;
                }
                Task::Multi(multi) => {
                    if progression.is_some() {
                        bail!("Sequence base must be a single task, got a multi-task");
                    }
                    return self.schedule_multi(multi, slot);
                }
                leaf => {
                    let keys = leaf.batching_keys();
                    let group = (keys.handler.clone(), keys.batch_key.clone());
                    let dedup = keys
                        .task_key
                        .map(|task_key| (keys.handler, keys.batch_key, task_key));
                    let prior = dedup
                        .as_ref()
                        .and_then(|key| self.ids_by_key.get(key))
                        .copied();

                    let bound = match prior {
                        // Coalesce with the earlier execution. A sequence
                        // still needs its own id so its continuation can
                        // rewrite the slot; the alias routes its result
                        // lookup to the prior id.
                        Some(prior) if progression.is_some() => {
                            self.aliases.insert(id, prior);
                            id
                        }
                        Some(prior) => prior,
                        None => {
                            if let Some(key) = dedup {
                                self.ids_by_key.insert(key, id);
                            }
                            self.batches.entry(group).or_default().insert(id, leaf);
                            id
                        }
                    };

                    self.skeleton.set(slot, SkeletonNode::Pending(bound));
                    if let Some(progression) = progression {
                        self.progressions.push((id, slot, progression));
                    }
                    return Ok(());
                }
            }
        }
    }

    /// The phase loop: dispatch every batch, then run the continuations
    /// those results unblock, until nothing remains.
    fn execute(&mut self) -> Result<()> {
        let mut phase = 0usize;
        loop {
            phase += 1;
            if let Some(cap) = self.scheduler.max_phases {
                if phase > cap {
                    bail!("Run exceeded {} phases, progression chain does not terminate", cap);
                }
            }

            let batches = mem::take(&mut self.batches);
            debug!(run = %self.run_id, phase, batches = batches.len(), "Dispatching phase");
            for ((handler_name, batch_key), tasks) in batches {
                let handler = self.scheduler.handler(&handler_name)?;
                let ids: Vec<TaskId> = tasks.keys().copied().collect();
                debug!(
                    run = %self.run_id,
                    handler = %handler_name,
                    batch_key = %batch_key,
                    tasks = ids.len(),
                    "Executing batch"
                );
                handler.execute_batch(&batch_key, tasks, &mut self.results)?;
                for id in ids {
                    if !self.results.contains_key(&id) {
                        warn!(
                            run = %self.run_id,
                            handler = %handler_name,
                            task = %id,
                            "Handler wrote no result for task, filling null"
                        );
                        self.results.insert(id, Value::Null);
                    }
                }
            }

            if self.progressions.is_empty() {
                return Ok(());
            }
            for (id, slot, progression) in mem::take(&mut self.progressions) {
                let source = self.aliases.get(&id).copied().unwrap_or(id);
                let value = self.results.get(&source).cloned().unwrap_or(Value::Null);
                match progression(value) {
                    Some(next) => self.schedule(next, slot)?,
                    None => self.skeleton.set(slot, SkeletonNode::Resolved(Value::Null)),
                }
            }
        }
    }

    fn into_response(self) -> ResultTree {
        let Run {
            aliases,
            results,
            skeleton,
            root,
            ..
        } = self;
        skeleton.resolve(root, &|id| {
            let source = aliases.get(&id).copied().unwrap_or(id);
            results.get(&source).cloned().unwrap_or(Value::Null)
        })
    }
}

/// Fold two peeled sequence layers into one continuation: run `first`, let
/// the task it returns settle, then hand that result to `then`.
fn chain(first: Progression, then: Progression) -> Progression {
    Box::new(move |value| match first(value) {
        Some(next) => Some(Task::Sequence(Box::new(SequenceTask::from_parts(
            next, then,
        )))),
        None => then(Value::Null),
    })
}
