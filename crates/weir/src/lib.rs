//! Weir: an embeddable schema-driven streaming query engine.
//!
//! This facade re-exports the engine and adds a process-wide default
//! [`Graph`] as an application-boundary convenience. Engine internals
//! never reference it; embedders that want explicit graphs should create
//! their own with [`Graph::new`].

use std::sync::OnceLock;

pub use weir_core::*;

static DEFAULT_GRAPH: OnceLock<Graph> = OnceLock::new();

/// The process-wide default graph, created on first use.
pub fn default_graph() -> &'static Graph {
    DEFAULT_GRAPH.get_or_init(Graph::new)
}

/// Run a query against the default graph.
pub fn query(
    query_like: impl Into<Query>,
    params: QueryParameters,
) -> Result<Stream, Error> {
    default_graph().query(query_like, params)
}

/// Create and mount a table on the default graph.
pub fn new_table(schema: TableSchema) -> Result<std::sync::Arc<Table>, Error> {
    default_graph().new_table(schema)
}

/// Mount a group of points on the default graph.
pub fn mount(points: Vec<MountPointSpec>) -> Result<Module, Error> {
    default_graph().mount(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_graph_round_trip() {
        let table = new_table(
            TableSchema::new()
                .with_name("facade_things")
                .with_attr("name", AttrConfig::new().indexed()),
        )
        .unwrap();
        table.put(Item::new().with("name", "a")).unwrap();

        let out = query(
            QueryTuple::new().with_attr("name"),
            QueryParameters::new(),
        )
        .unwrap();
        let (items, errors) = out.collect_items().await;
        assert!(errors.is_empty());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("name").unwrap().as_str(), Some("a"));
    }
}
