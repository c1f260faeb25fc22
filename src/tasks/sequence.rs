use std::fmt::{self, Debug, Formatter};

use serde_json::Value;

use crate::runtime::task::{Progression, Task};

/// A composite task: a base step plus a progression function.
///
/// The progression receives the base's result and returns the next task,
/// or `None` to end the chain with a `Null` result. Sequences are never
/// dispatched to a handler; the scheduler recognizes them and splits their
/// steps across phases.
pub struct SequenceTask {
    base: Task,
    progression: Progression,
}

impl SequenceTask {
    pub fn new(
        base: Task,
        progression: impl FnOnce(Value) -> Option<Task> + Send + 'static,
    ) -> Self {
        Self {
            base,
            progression: Box::new(progression),
        }
    }

    pub fn from_parts(base: Task, progression: Progression) -> Self {
        Self { base, progression }
    }

    pub fn base(&self) -> &Task {
        &self.base
    }

    pub fn into_parts(self) -> (Task, Progression) {
        (self.base, self.progression)
    }
}

impl Debug for SequenceTask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceTask")
            .field("base", &self.base)
            .field("progression", &"<closure>")
            .finish()
    }
}
