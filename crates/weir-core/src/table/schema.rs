//! Table schemas and per-attribute configuration.

use std::sync::Arc;

use crate::table::Table;

/// What to do when a put conflicts with an existing unique value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Replace the conflicting row with the new item.
    Overwrite,
    /// Reject the put with a unique-violation error.
    Error,
    /// Silently discard the new item; the existing row survives.
    DropNew,
}

/// What to do to referencing rows when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Delete the referencing rows too.
    Cascade,
    /// Null out the referencing attribute.
    SetNull,
}

/// How generated attribute values are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateMethod {
    /// Strictly increasing counter, starting at 1.
    Increment,
    /// Random hex string.
    Random,
    /// Microsecond timestamp taken at put time.
    TimePut,
}

/// Unique constraint configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub on_conflict: OnConflict,
}

/// Generated-value configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateConfig {
    pub method: GenerateMethod,
    /// Prepended to increment and random values.
    pub prefix: Option<String>,
    /// Hex length for random values (default 8).
    pub length: Option<usize>,
}

impl GenerateConfig {
    pub fn new(method: GenerateMethod) -> Self {
        Self {
            method,
            prefix: None,
            length: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }
}

/// A foreign-key reference to another table.
#[derive(Clone)]
pub struct ForeignKey {
    /// The referenced table.
    pub table: Arc<Table>,
    /// The referenced attribute on that table.
    pub attr: String,
    pub on_delete: OnDelete,
}

impl std::fmt::Debug for ForeignKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignKey")
            .field("table", &self.table.name())
            .field("attr", &self.attr)
            .field("on_delete", &self.on_delete)
            .finish()
    }
}

/// Per-attribute schema configuration.
///
/// `required` is tri-state: unset attrs default to required when the
/// table is mounted (generated attrs excepted), matching the mount
/// adapter's contract-building rule.
#[derive(Debug, Clone, Default)]
pub struct AttrConfig {
    pub index: bool,
    pub required: Option<bool>,
    pub type_hint: Option<String>,
    pub unique: Option<UniqueConstraint>,
    pub generate: Option<GenerateConfig>,
    pub foreign_key: Option<ForeignKey>,
}

impl AttrConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    pub fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn type_hint(mut self, hint: impl Into<String>) -> Self {
        self.type_hint = Some(hint.into());
        self
    }

    pub fn unique(mut self, on_conflict: OnConflict) -> Self {
        self.unique = Some(UniqueConstraint { on_conflict });
        self
    }

    pub fn generate(mut self, config: GenerateConfig) -> Self {
        self.generate = Some(config);
        self
    }

    pub fn foreign_key(
        mut self,
        table: &Arc<Table>,
        attr: impl Into<String>,
        on_delete: OnDelete,
    ) -> Self {
        self.foreign_key = Some(ForeignKey {
            table: table.clone(),
            attr: attr.into(),
            on_delete,
        });
        self
    }
}

/// A table schema: named attribute configs plus explicit indexes.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    pub name: Option<String>,
    /// Extra presence-only attrs the table mounts under (namespacing).
    pub mount_as: Option<String>,
    attrs: Vec<(String, AttrConfig)>,
    /// Multi-attribute index declarations.
    indexes: Vec<Vec<String>>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mount_as(mut self, mount_as: impl Into<String>) -> Self {
        self.mount_as = Some(mount_as.into());
        self
    }

    /// Add an attribute with its config (last write wins on duplicates).
    pub fn with_attr(mut self, attr: impl Into<String>, config: AttrConfig) -> Self {
        let attr = attr.into();
        if let Some(existing) = self.attrs.iter_mut().find(|(a, _)| *a == attr) {
            existing.1 = config;
        } else {
            self.attrs.push((attr, config));
        }
        self
    }

    /// Add a plain (optional, unindexed) attribute.
    pub fn with_plain_attr(self, attr: impl Into<String>) -> Self {
        self.with_attr(attr, AttrConfig::new())
    }

    /// Declare a multi-attribute index.
    pub fn with_index(mut self, attrs: Vec<String>) -> Self {
        self.indexes.push(attrs);
        self
    }

    /// Attribute configs in declaration order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &AttrConfig)> {
        self.attrs.iter().map(|(a, c)| (a.as_str(), c))
    }

    pub fn get_attr(&self, attr: &str) -> Option<&AttrConfig> {
        self.attrs.iter().find(|(a, _)| a == attr).map(|(_, c)| c)
    }

    /// Fill in implied configuration: any `generate` attr gets a unique
    /// constraint (error policy) if unconfigured, and any `generate` or
    /// `unique` attr gets an index.
    pub fn normalized(mut self) -> Self {
        for (_, config) in &mut self.attrs {
            if config.generate.is_some() && config.unique.is_none() {
                config.unique = Some(UniqueConstraint {
                    on_conflict: OnConflict::Error,
                });
            }
            if config.unique.is_some() || config.generate.is_some() {
                config.index = true;
            }
        }
        self
    }

    /// Every index the table should maintain: one per indexed attr plus
    /// the explicit multi-attr declarations, deduplicated by sorted attrs.
    pub fn index_attr_sets(&self) -> Vec<Vec<String>> {
        let mut sets: Vec<Vec<String>> = Vec::new();

        let mut add = |mut attrs: Vec<String>| {
            attrs.sort();
            if !sets.contains(&attrs) {
                sets.push(attrs);
            }
        };

        for (attr, config) in &self.attrs {
            if config.index {
                add(vec![attr.clone()]);
            }
        }
        for index in &self.indexes {
            add(index.clone());
        }

        sets
    }
}
