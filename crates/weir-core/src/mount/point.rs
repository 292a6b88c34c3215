//! Mount point contracts.

use crate::exec::NativeCallback;

/// How a mount point treats one attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountAttr {
    /// The attr must be present in a matching tuple.
    pub required: bool,
    /// The callback needs a value for this attr (from the query or a
    /// runtime parameter).
    pub requires_value: bool,
    /// The callback can use a value for this attr to narrow results.
    pub accepts_value: bool,
    /// The callback produces this attr in its output items.
    pub is_output: bool,
}

impl MountAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn requires_value(mut self) -> Self {
        self.requires_value = true;
        self
    }

    pub fn accepts_value(mut self) -> Self {
        self.accepts_value = true;
        self
    }

    pub fn output(mut self) -> Self {
        self.is_output = true;
        self
    }
}

/// A capability declaration: attribute contract plus implementation.
///
/// Specs are built programmatically (the decl-string parser is an external
/// collaborator). Duplicate attribute names are rejected when the spec is
/// registered into a module.
#[derive(Clone, Default)]
pub struct MountPointSpec {
    pub name: Option<String>,
    pub(crate) attrs: Vec<(String, MountAttr)>,
    pub(crate) callback: Option<NativeCallback>,
    /// Accept tuples carrying attrs this point doesn't declare.
    pub accepts_unknown: bool,
}

impl MountPointSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare an attribute. Later declarations of the same name win; the
    /// duplicate is reported when the spec is registered.
    pub fn attr(mut self, name: impl Into<String>, config: MountAttr) -> Self {
        self.attrs.push((name.into(), config));
        self
    }

    /// Declare a required presence-only attribute.
    pub fn required_attr(self, name: impl Into<String>) -> Self {
        self.attr(name, MountAttr::new().required())
    }

    pub fn with_callback(mut self, callback: NativeCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.accepts_unknown = true;
        self
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &MountAttr)> {
        self.attrs.iter().map(|(a, c)| (a.as_str(), c))
    }
}

impl std::fmt::Debug for MountPointSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountPointSpec")
            .field("name", &self.name)
            .field("decl", &decl_string(&self.attrs))
            .finish()
    }
}

/// A resolved mount point inside a module.
pub struct MountPoint {
    pub name: Option<String>,
    pub module_id: u64,
    pub point_id: u64,
    attrs: Vec<(String, MountAttr)>,
    pub(crate) callback: Option<NativeCallback>,
    pub accepts_unknown: bool,
    pub required_attr_count: usize,
}

impl MountPoint {
    pub(crate) fn from_spec(spec: MountPointSpec, module_id: u64, point_id: u64) -> Self {
        let required_attr_count = spec.attrs.iter().filter(|(_, a)| a.required).count();
        Self {
            name: spec.name,
            module_id,
            point_id,
            attrs: spec.attrs,
            callback: spec.callback,
            accepts_unknown: spec.accepts_unknown,
            required_attr_count,
        }
    }

    pub fn has(&self, attr: &str) -> bool {
        self.attrs.iter().any(|(a, _)| a == attr)
    }

    pub fn get_attr(&self, attr: &str) -> Option<&MountAttr> {
        self.attrs.iter().find(|(a, _)| a == attr).map(|(_, c)| c)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &MountAttr)> {
        self.attrs.iter().map(|(a, c)| (a.as_str(), c))
    }

    pub fn requires_value(&self, attr: &str) -> bool {
        self.get_attr(attr).map(|a| a.requires_value).unwrap_or(false)
    }

    pub fn callback(&self) -> Option<&NativeCallback> {
        self.callback.as_ref()
    }

    /// Declaration-style string, for logs and error messages.
    pub fn decl_string(&self) -> String {
        decl_string(&self.attrs)
    }
}

impl std::fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountPoint")
            .field("name", &self.name)
            .field("module_id", &self.module_id)
            .field("point_id", &self.point_id)
            .field("decl", &self.decl_string())
            .finish()
    }
}

fn decl_string(attrs: &[(String, MountAttr)]) -> String {
    attrs
        .iter()
        .map(|(attr, config)| {
            let mut out = attr.clone();
            if !config.required && !config.requires_value {
                out.push('?');
            }
            if config.requires_value {
                out.push_str("=x");
            }
            out
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decl_string() {
        let spec = MountPointSpec::new()
            .required_attr("user")
            .attr("id", MountAttr::new().required().requires_value())
            .attr("name", MountAttr::new().output());
        let point = MountPoint::from_spec(spec, 1, 1);
        assert_eq!(point.decl_string(), "user id=x name?");
        assert_eq!(point.required_attr_count, 2);
    }

    #[test]
    fn test_attr_lookup() {
        let spec = MountPointSpec::new().attr("a", MountAttr::new().requires_value());
        let point = MountPoint::from_spec(spec, 1, 1);
        assert!(point.has("a"));
        assert!(point.requires_value("a"));
        assert!(!point.has("b"));
    }
}
