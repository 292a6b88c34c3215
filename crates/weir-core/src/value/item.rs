//! Items: ordered attribute records.

use crate::error::Error;
use crate::value::Value;

/// An ordered mapping of attribute name to value.
///
/// Insertion order is preserved and keys are unique; `set` on an existing
/// attribute overwrites in place. Items are small, so lookups are linear
/// over the backing vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    fields: Vec<(String, Value)>,
}

impl Item {
    /// Create an empty item.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Builder-style set.
    pub fn with(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attr, value);
        self
    }

    /// Set an attribute, overwriting in place if it exists.
    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<Value>) {
        let attr = attr.into();
        let value = value.into();
        for field in &mut self.fields {
            if field.0 == attr {
                field.1 = value;
                return;
            }
        }
        self.fields.push((attr, value));
    }

    /// Get an attribute value.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.fields.iter().find(|(a, _)| a == attr).map(|(_, v)| v)
    }

    /// Whether the attribute is present (even if null).
    pub fn has(&self, attr: &str) -> bool {
        self.fields.iter().any(|(a, _)| a == attr)
    }

    /// Remove an attribute, returning its value.
    pub fn remove(&mut self, attr: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(a, _)| a == attr)?;
        Some(self.fields.remove(idx).1)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the item has no attributes.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over (attr, value) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(a, v)| (a.as_str(), v))
    }

    /// Attribute names in insertion order.
    pub fn attrs(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(a, _)| a.as_str())
    }

    /// Merge another item's attributes into this one (theirs win).
    pub fn merge(&mut self, other: &Item) {
        for (attr, value) in other.iter() {
            self.set(attr, value.clone());
        }
    }

    /// Convert to a JSON object. Fails if any value has no plain form.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        let mut map = serde_json::Map::new();
        for (attr, value) in self.iter() {
            map.insert(attr.to_string(), value.to_json()?);
        }
        Ok(serde_json::Value::Object(map))
    }

    /// Build an item from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        match value {
            serde_json::Value::Object(map) => {
                let mut item = Item::new();
                for (attr, v) in map {
                    item.set(attr, Value::from_json(v));
                }
                Ok(item)
            }
            other => Err(Error::Serialization(format!(
                "expected a JSON object for an item, got: {other}"
            ))),
        }
    }
}

impl FromIterator<(String, Value)> for Item {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut item = Item::new();
        for (attr, value) in iter {
            item.set(attr, value);
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let item = Item::new().with("b", 1i64).with("a", 2i64).with("c", 3i64);
        let attrs: Vec<&str> = item.attrs().collect();
        assert_eq!(attrs, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut item = Item::new().with("a", 1i64).with("b", 2i64);
        item.set("a", 9i64);

        let attrs: Vec<&str> = item.attrs().collect();
        assert_eq!(attrs, vec!["a", "b"]);
        assert_eq!(item.get("a"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_merge_theirs_win() {
        let mut left = Item::new().with("a", 1i64).with("b", 2i64);
        let right = Item::new().with("b", 5i64).with("c", 6i64);
        left.merge(&right);

        assert_eq!(left.get("b"), Some(&Value::Int(5)));
        assert_eq!(left.get("c"), Some(&Value::Int(6)));
        assert_eq!(left.len(), 3);
    }

    #[test]
    fn test_json_roundtrip() {
        let item = Item::new().with("name", "ada").with("age", 36i64);
        let json = item.to_json().unwrap();
        let back = Item::from_json(json).unwrap();
        assert_eq!(back.get("name").unwrap().as_str(), Some("ada"));
        assert_eq!(back.get("age").unwrap().as_i64(), Some(36));
    }
}
