//! Secondary indexes over canonical value strings.

use std::collections::HashMap;

use crate::value::Item;

/// An index over one or more attributes.
///
/// Keys are the canonical string forms of the indexed attribute values, so
/// a query literal `"5"` and a stored `Int(5)` land on the same bucket,
/// the same equivalence the engine's equality filters use.
#[derive(Debug)]
pub(crate) struct TableIndex {
    /// Indexed attributes, sorted.
    attrs: Vec<String>,
    buckets: HashMap<Vec<String>, Vec<u64>>,
}

impl TableIndex {
    /// Create an index over the given attrs (must be pre-sorted).
    pub fn new(attrs: Vec<String>) -> Self {
        debug_assert!(attrs.windows(2).all(|w| w[0] <= w[1]));
        Self {
            attrs,
            buckets: HashMap::new(),
        }
    }

    pub fn attrs(&self) -> &[String] {
        &self.attrs
    }

    /// Whether this index serves a filter over exactly these sorted attrs.
    pub fn covers(&self, sorted_attrs: &[String]) -> bool {
        self.attrs == sorted_attrs
    }

    /// The bucket key for an item. None when the item lacks an indexed
    /// attr entirely (such rows are not indexed).
    pub fn key_for(&self, item: &Item) -> Option<Vec<String>> {
        self.attrs
            .iter()
            .map(|attr| item.get(attr).map(|v| v.canonical_string()))
            .collect()
    }

    pub fn insert(&mut self, item: &Item, row_id: u64) {
        if let Some(key) = self.key_for(item) {
            self.buckets.entry(key).or_default().push(row_id);
        }
    }

    pub fn remove(&mut self, item: &Item, row_id: u64) {
        if let Some(key) = self.key_for(item) {
            if let Some(bucket) = self.buckets.get_mut(&key) {
                bucket.retain(|id| *id != row_id);
                if bucket.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
    }

    /// Row ids matching a key, in insertion order.
    pub fn get(&self, key: &[String]) -> Vec<u64> {
        let mut ids = self
            .buckets
            .get(key)
            .cloned()
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}
