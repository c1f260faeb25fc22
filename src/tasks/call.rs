use serde_json::{Map, Value};

use crate::runtime::task::{BatchKeys, DEFAULT_BATCH_KEY};

/// A leaf task bound to a registered handler.
///
/// Carries the three batching keys plus an opaque parameter value the
/// handler interprets. Tasks sharing `(handler, batch_key)` land in one
/// batch call; tasks that also share a `task_key` are executed once.
#[derive(Debug)]
pub struct CallTask {
    handler: String,
    batch_key: String,
    task_key: Option<String>,
    params: Value,
}

impl CallTask {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            batch_key: DEFAULT_BATCH_KEY.to_string(),
            task_key: None,
            params: Value::Null,
        }
    }

    /// Handler-specific bucket; defaults to `"default"`.
    pub fn batch_key(mut self, batch_key: impl Into<String>) -> Self {
        self.batch_key = batch_key.into();
        self
    }

    /// Deduplication identifier within `(handler, batch_key)`.
    pub fn task_key(mut self, task_key: impl Into<String>) -> Self {
        self.task_key = Some(task_key.into());
        self
    }

    /// Insert a single named parameter. Replaces a non-object payload.
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.params.is_object() {
            self.params = Value::Object(Map::new());
        }
        if let Some(object) = self.params.as_object_mut() {
            object.insert(key.to_string(), value.into());
        }
        self
    }

    /// Replace the whole parameter value.
    pub fn payload(mut self, params: impl Into<Value>) -> Self {
        self.params = params.into();
        self
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn keys(&self) -> BatchKeys {
        BatchKeys {
            handler: self.handler.clone(),
            batch_key: self.batch_key.clone(),
            task_key: self.task_key.clone(),
        }
    }
}
