//! Modules: atomically swappable groups of mount points.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Error;
use crate::mount::{MountPoint, MountPointSpec};

struct ModuleInner {
    module_id: u64,
    points: RwLock<Vec<Arc<MountPoint>>>,
    next_point_id: AtomicU64,
}

/// An atomically swappable ordered list of mount points.
///
/// `redefine` replaces the whole list in one step; consumers relying on
/// compiled-plan caches must invalidate on any redefinition (the graph
/// does this in `on_module_change`).
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

impl Module {
    pub(crate) fn new(module_id: u64) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                module_id,
                points: RwLock::new(Vec::new()),
                next_point_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn module_id(&self) -> u64 {
        self.inner.module_id
    }

    /// The current points, in declaration order.
    pub fn points(&self) -> Vec<Arc<MountPoint>> {
        self.inner.points.read().clone()
    }

    /// Find a point by its id.
    pub fn point_by_id(&self, point_id: u64) -> Option<Arc<MountPoint>> {
        self.inner
            .points
            .read()
            .iter()
            .find(|p| p.point_id == point_id)
            .cloned()
    }

    /// Replace every point in one atomic step.
    ///
    /// A spec declaring the same attribute twice is a programmer error and
    /// fails the whole redefinition, leaving the previous points in place.
    pub(crate) fn replace_points(&self, specs: Vec<MountPointSpec>) -> Result<(), Error> {
        for spec in &specs {
            let mut seen = HashSet::new();
            for (attr, _) in spec.attrs() {
                if !seen.insert(attr.to_string()) {
                    return Err(Error::DuplicateAttr(attr.to_string()));
                }
            }
        }

        let points: Vec<Arc<MountPoint>> = specs
            .into_iter()
            .map(|spec| {
                let point_id = self.inner.next_point_id.fetch_add(1, Ordering::SeqCst);
                Arc::new(MountPoint::from_spec(spec, self.inner.module_id, point_id))
            })
            .collect();

        *self.inner.points.write() = points;
        Ok(())
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("module_id", &self.inner.module_id)
            .field("points", &self.inner.points.read().len())
            .finish()
    }
}
