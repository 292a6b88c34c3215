//! One pipeline step: an ordered sequence of query tags.

use crate::error::Error;
use crate::query::{QueryParameters, QueryTag};
use crate::value::{Item, TaggedValue, Value};

/// An ordered sequence of [`QueryTag`]s representing one pipeline step
/// (e.g. `get table attr=5`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTuple {
    tags: Vec<QueryTag>,
}

impl QueryTuple {
    /// Create an empty tuple.
    pub fn new() -> Self {
        Self { tags: Vec::new() }
    }

    /// Create from a list of tags.
    pub fn from_tags(tags: Vec<QueryTag>) -> Self {
        Self { tags }
    }

    /// Builder-style tag append.
    pub fn with_tag(mut self, tag: QueryTag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Builder-style presence-only attr.
    pub fn with_attr(self, attr: impl Into<String>) -> Self {
        self.with_tag(QueryTag::new(attr))
    }

    /// Builder-style attr=value.
    pub fn with_value(self, attr: impl Into<String>, value: impl Into<TaggedValue>) -> Self {
        self.with_tag(QueryTag::new(attr).with_value(value))
    }

    /// The tags in order.
    pub fn tags(&self) -> &[QueryTag] {
        &self.tags
    }

    /// The first tag, whose attr names the verb.
    pub fn first(&self) -> Option<&QueryTag> {
        self.tags.first()
    }

    /// Whether the attr is present.
    pub fn has(&self, attr: &str) -> bool {
        self.tags.iter().any(|t| t.attr == attr)
    }

    /// Get the tag for an attr.
    pub fn get_attr(&self, attr: &str) -> Option<&QueryTag> {
        self.tags.iter().find(|t| t.attr == attr)
    }

    /// Unwrapped value for an attr, if the tag supplies one.
    pub fn get_value(&self, attr: &str) -> Option<Value> {
        let tag = self.get_attr(attr)?;
        if !tag.provides_value() {
            return None;
        }
        tag.value.unwrap().ok()
    }

    /// Append a tag.
    pub fn add_tag(&mut self, tag: QueryTag) {
        self.tags.push(tag);
    }

    /// Append a tag, or overwrite an existing tag with the same attr.
    pub fn add_or_overwrite_tag(&mut self, tag: QueryTag) {
        for existing in &mut self.tags {
            if existing.attr == tag.attr {
                *existing = tag;
                return;
            }
        }
        self.tags.push(tag);
    }

    /// Remove every tag with the given attr.
    pub fn delete_attr(&mut self, attr: &str) {
        self.tags.retain(|t| t.attr != attr);
    }

    /// A copy without the first tag (the verb).
    pub fn without_first_tag(&self) -> QueryTuple {
        QueryTuple {
            tags: self.tags.iter().skip(1).cloned().collect(),
        }
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the tuple has no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Replace identifier-bound tags with literal values from `params`.
    /// Tags whose parameter is absent are left untouched.
    pub fn inject_parameters(&self, params: &QueryParameters) -> QueryTuple {
        let tags = self
            .tags
            .iter()
            .map(|tag| {
                let Some(identifier) = &tag.identifier else {
                    return tag.clone();
                };
                match params.get(identifier) {
                    Some(value) => QueryTag {
                        attr: tag.attr.clone(),
                        value: TaggedValue::from_value(value),
                        identifier: None,
                        is_optional: tag.is_optional,
                    },
                    None => tag.clone(),
                }
            })
            .collect();
        QueryTuple { tags }
    }

    /// Fail if any identifier-bound tag with no literal value is missing
    /// from `params`.
    pub fn check_filled_parameters(&self, params: &QueryParameters) -> Result<(), Error> {
        for tag in &self.tags {
            if let Some(identifier) = &tag.identifier {
                if !tag.provides_value() && !params.has(identifier) {
                    return Err(Error::MissingParameter(identifier.clone()));
                }
            }
        }
        Ok(())
    }

    /// View the tuple as an item: attr → unwrapped value. Presence-only
    /// tags map to null; abstract placeholders also map to null.
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        for tag in &self.tags {
            let value = tag.value.unwrap().unwrap_or(Value::Null);
            item.set(tag.attr.clone(), value);
        }
        item
    }

    /// Build a tuple from an item's attributes.
    pub fn from_item(item: &Item) -> QueryTuple {
        let tags = item
            .iter()
            .map(|(attr, value)| QueryTag {
                attr: attr.to_string(),
                value: TaggedValue::from_value(value),
                identifier: None,
                is_optional: false,
            })
            .collect();
        QueryTuple { tags }
    }

    /// Canonical string form.
    pub fn to_query_string(&self) -> String {
        self.tags
            .iter()
            .map(|t| t.to_query_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_string() {
        let tuple = QueryTuple::new()
            .with_attr("get")
            .with_attr("user")
            .with_value("id", "7");
        assert_eq!(tuple.to_query_string(), "get user id=7");
    }

    #[test]
    fn test_without_first_tag() {
        let tuple = QueryTuple::new().with_attr("get").with_attr("user");
        let rest = tuple.without_first_tag();
        assert_eq!(rest.to_query_string(), "user");
        assert_eq!(tuple.len(), 2);
    }

    #[test]
    fn test_inject_parameters() {
        let tuple = QueryTuple::new()
            .with_attr("user")
            .with_tag(QueryTag::new("id").with_identifier("id"));

        let params = QueryParameters::new().with("id", Value::Int(9));
        let injected = tuple.inject_parameters(&params);

        assert_eq!(injected.get_attr("id").unwrap().value, TaggedValue::String("9".into()));
        assert!(injected.get_attr("id").unwrap().identifier.is_none());

        // Missing params leave the tag untouched.
        let untouched = tuple.inject_parameters(&QueryParameters::new());
        assert!(untouched.get_attr("id").unwrap().identifier.is_some());
    }

    #[test]
    fn test_check_filled_parameters() {
        let tuple = QueryTuple::new().with_tag(QueryTag::new("id").with_identifier("id"));

        let err = tuple
            .check_filled_parameters(&QueryParameters::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingParameter(name) if name == "id"));

        tuple
            .check_filled_parameters(&QueryParameters::new().with("id", Value::Int(1)))
            .unwrap();
    }

    #[test]
    fn test_add_or_overwrite() {
        let mut tuple = QueryTuple::new().with_value("a", "1").with_attr("b");
        tuple.add_or_overwrite_tag(QueryTag::new("a").with_value("2"));
        assert_eq!(tuple.len(), 2);
        assert_eq!(tuple.get_value("a").unwrap(), Value::String("2".into()));
    }

    #[test]
    fn test_to_item_and_back() {
        let tuple = QueryTuple::new().with_value("a", "1").with_attr("b");
        let item = tuple.to_item();
        assert_eq!(item.get("a"), Some(&Value::String("1".into())));
        assert_eq!(item.get("b"), Some(&Value::Null));

        let back = QueryTuple::from_item(&item);
        assert_eq!(back.get_attr("a").unwrap().value, TaggedValue::String("1".into()));
    }
}
