//! Weir core: planner, streaming runtime, and table engine.
//!
//! This crate provides the embeddable query engine: tables and mount
//! points register declarative attribute contracts; callers issue small
//! pipeline queries which are matched against those contracts, compiled
//! into execution plans, and run as asynchronous event streams.

pub mod error;
pub mod exec;
pub mod graph;
pub mod mount;
pub mod plan;
pub mod query;
pub mod stream;
pub mod table;
pub mod value;
pub mod verbs;

pub use error::{Error, ErrorItem, ErrorKind};
pub use exec::{native_callback, CallbackOutput, NativeCallback, Task};
pub use graph::{run_query_with_provider, Graph, Provider, QueryExecutionContext, SchemaChange};
pub use mount::{table_mount_points, Module, MountAttr, MountPoint, MountPointSpec, TableMountConfig};
pub use plan::{ExpectedValue, MultiStepPlan, OutputAttr, OutputFilter, Plan};
pub use query::{Query, QueryParameters, QueryTag, QueryTuple};
pub use stream::{
    join_streams, streaming_transform, tee, Receiver, Stream, StreamEvent,
    StreamingTransformOptions,
};
pub use table::{
    AttrConfig, ForeignKey, GenerateConfig, GenerateMethod, OnConflict, OnDelete, Table,
    TableReceiver, TableSchema, UniqueConstraint,
};
pub use value::{Item, TaggedValue, Value};
