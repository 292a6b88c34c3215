//! Per-query execution context.

use std::collections::HashMap;

use crate::value::Value;

/// Context threaded through a query execution and every nested query it
/// spawns.
#[derive(Debug, Clone, Default)]
pub struct QueryExecutionContext {
    /// Environment values callbacks can read via `Task::get_env`.
    pub env: HashMap<String, Value>,
    /// The caller promises not to mutate anything.
    pub readonly: bool,
    /// Tags identifying the external connection this query runs for; the
    /// graph closes all resources opened under a tag on disconnect.
    pub resource_tags: Vec<String>,
}

impl QueryExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn with_resource_tag(mut self, tag: impl Into<String>) -> Self {
        self.resource_tags.push(tag.into());
        self
    }
}
