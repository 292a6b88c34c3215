//! Mount points: declarative capability contracts and their modules.

mod matcher;
mod module;
mod point;
mod table_mount;

pub use matcher::{find_best_match, query_mount_match, MatchResult};
pub use module::Module;
pub use point::{MountAttr, MountPoint, MountPointSpec};
pub use table_mount::{table_mount_points, TableMountConfig};
