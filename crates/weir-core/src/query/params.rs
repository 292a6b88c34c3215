//! Caller-supplied parameters for a query execution.

use std::collections::HashMap;

use crate::stream::Stream;
use crate::value::{Item, Value};

/// Named values bound to identifier tags at execution time, plus an
/// optional pre-existing input stream that turns the query into a
/// transform.
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    values: HashMap<String, Value>,
    /// Pre-existing input stream for transforms.
    pub input: Option<Stream>,
}

impl QueryParameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style set.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style input stream.
    pub fn with_input(mut self, input: Stream) -> Self {
        self.input = Some(input);
        self
    }

    /// Set a parameter.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up a parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether a parameter is present.
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate over (name, value) pairs. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parameters built from an item's attributes.
    pub fn from_item(item: &Item) -> Self {
        let mut params = Self::new();
        for (attr, value) in item.iter() {
            params.set(attr, value.clone());
        }
        params
    }

    /// A copy where the item's attributes fill in missing names; existing
    /// parameters win. Used by joins to layer a left-hand item under the
    /// caller's parameters.
    pub fn layered_under(&self, item: &Item) -> Self {
        let mut merged = Self::from_item(item);
        for (name, value) in self.iter() {
            merged.set(name, value.clone());
        }
        merged.input = self.input.clone();
        merged
    }
}
