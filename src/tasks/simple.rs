use std::fmt::{self, Debug, Formatter};

use serde_json::Value;

/// A non-coalescable task wrapping an opaque thunk.
///
/// Simple tasks run one at a time inside the `simple` handler's batch and
/// carry no task key, so they are never deduplicated.
pub struct SimpleTask {
    thunk: Box<dyn FnOnce() -> Value + Send>,
}

impl SimpleTask {
    pub fn new(thunk: impl FnOnce() -> Value + Send + 'static) -> Self {
        Self {
            thunk: Box::new(thunk),
        }
    }

    /// Consume the task and invoke its thunk.
    pub fn run(self) -> Value {
        (self.thunk)()
    }
}

impl Debug for SimpleTask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleTask")
            .field("thunk", &"<closure>")
            .finish()
    }
}
