//! In-memory tables: schema, indexes, mutation, change feeds, patches.

mod index;
mod patch;
mod schema;
#[allow(clippy::module_inception)]
mod table;

pub use patch::TableReceiver;
pub use schema::{
    AttrConfig, ForeignKey, GenerateConfig, GenerateMethod, OnConflict, OnDelete, TableSchema,
    UniqueConstraint,
};
pub use table::Table;

pub(crate) use index::TableIndex;
