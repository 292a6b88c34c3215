//! External query providers.

use std::sync::Arc;

use crate::error::{ErrorItem, ErrorKind};
use crate::graph::Graph;
use crate::query::Query;
use crate::stream::Stream;

/// A registered external query runner. Providers take whole queries and
/// return their own result streams (typically bridging to a remote
/// engine).
#[derive(Clone)]
pub struct Provider {
    pub provider_id: String,
    run_query: Arc<dyn Fn(Query, Stream) -> Stream + Send + Sync>,
}

impl Provider {
    pub(crate) fn new(
        provider_id: String,
        run_query: Arc<dyn Fn(Query, Stream) -> Stream + Send + Sync>,
    ) -> Self {
        Self {
            provider_id,
            run_query,
        }
    }

    pub fn run_query(&self, query: Query, input: Stream) -> Stream {
        (self.run_query)(query, input)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("provider_id", &self.provider_id)
            .finish()
    }
}

/// Delegate a query to a provider by id. An unknown id yields a stream
/// carrying one `provider_not_found` error and `done`.
pub fn run_query_with_provider(
    graph: &Graph,
    provider_id: &str,
    query: Query,
    input: Stream,
) -> Stream {
    match graph.provider(provider_id) {
        Some(provider) => provider.run_query(query, input),
        None => {
            let out = Stream::with_label("run_query_with_provider error");
            let _ = out.put_error(ErrorItem::new(
                ErrorKind::ProviderNotFound,
                format!("provider not found: {provider_id}"),
            ));
            let _ = out.done();
            out
        }
    }
}
