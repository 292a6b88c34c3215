//! A single attribute entry within a query tuple.

use crate::value::TaggedValue;

/// One attribute within a [`crate::query::QueryTuple`].
///
/// A tag with an `identifier` and no literal value means "bind this
/// attribute to a caller-supplied parameter of that name at execution
/// time".
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTag {
    /// Attribute name.
    pub attr: String,
    /// Literal value, or `NoValue` when the tag is presence-only.
    pub value: TaggedValue,
    /// Name to bind at runtime from caller parameters.
    pub identifier: Option<String>,
    /// Optional tags don't have to be accepted by a mount point.
    pub is_optional: bool,
}

impl QueryTag {
    /// Create a presence-only tag.
    pub fn new(attr: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            value: TaggedValue::NoValue,
            identifier: None,
            is_optional: false,
        }
    }

    /// Set a literal value.
    pub fn with_value(mut self, value: impl Into<TaggedValue>) -> Self {
        self.value = value.into();
        self
    }

    /// Bind the attribute to a runtime parameter of the given name.
    pub fn with_identifier(mut self, name: impl Into<String>) -> Self {
        self.identifier = Some(name.into());
        self
    }

    /// Mark the tag optional.
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    /// Whether the tag supplies a literal value.
    pub fn provides_value(&self) -> bool {
        !self.value.is_no_value()
    }

    /// Canonical string form of this tag.
    pub fn to_query_string(&self) -> String {
        let mut out = self.attr.clone();

        if self.is_optional {
            out.push('?');
        }

        if self.provides_value() {
            out.push('=');
            out.push_str(&value_literal_string(&self.value));
        } else if let Some(identifier) = &self.identifier {
            out.push_str("=$");
            out.push_str(identifier);
        }

        out
    }
}

fn value_literal_string(value: &TaggedValue) -> String {
    match value {
        TaggedValue::String(s) => {
            let needs_quotes = s.is_empty()
                || s.chars()
                    .any(|c| c.is_whitespace() || matches!(c, '|' | '(' | ')' | '=' | '"' | '$'));
            if needs_quotes {
                format!("\"{}\"", s.escape_default())
            } else {
                s.clone()
            }
        }
        other => other.to_display_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_tag_string() {
        assert_eq!(QueryTag::new("a").to_query_string(), "a");
        assert_eq!(QueryTag::new("a").optional().to_query_string(), "a?");
    }

    #[test]
    fn test_value_tag_string() {
        assert_eq!(
            QueryTag::new("a").with_value("5").to_query_string(),
            "a=5"
        );
        assert_eq!(
            QueryTag::new("a").with_value(true).to_query_string(),
            "a=true"
        );
        assert_eq!(
            QueryTag::new("a").with_value("two words").to_query_string(),
            "a=\"two words\""
        );
    }

    #[test]
    fn test_identifier_tag_string() {
        assert_eq!(
            QueryTag::new("a").with_identifier("x").to_query_string(),
            "a=$x"
        );
    }
}
