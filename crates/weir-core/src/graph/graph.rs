//! The top-level registry composing tables, mount points, verbs, and
//! providers, with the public `query()` entry point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;

use crate::error::Error;
use crate::exec::NativeCallback;
use crate::graph::{Provider, QueryExecutionContext};
use crate::mount::{find_best_match, table_mount_points, Module, MountPoint, MountPointSpec, TableMountConfig};
use crate::plan::MultiStepPlan;
use crate::query::{Query, QueryParameters, QueryTuple};
use crate::stream::Stream;
use crate::table::{Table, TableSchema};
use crate::value::Item;

/// Notification payload for schema listeners.
#[derive(Debug, Clone)]
pub struct SchemaChange {
    pub module_id: u64,
}

type SchemaListener = Arc<dyn Fn(&SchemaChange) + Send + Sync>;
type AmbiguityHook = Arc<dyn Fn(&str) + Send + Sync>;

struct GraphInner {
    graph_id: String,
    modules: RwLock<Vec<Module>>,
    next_module_id: AtomicU64,
    next_table_id: AtomicU64,
    next_provider_id: AtomicU64,
    tables_by_name: DashMap<String, Arc<Table>>,
    custom_verbs: DashMap<String, NativeCallback>,
    providers: DashMap<String, Provider>,
    plan_cache: Mutex<Option<HashMap<String, MultiStepPlan>>>,
    enable_overprovide_filter: AtomicBool,
    schema_listeners: Mutex<Vec<SchemaListener>>,
    resources: DashMap<String, Vec<Stream>>,
    ambiguity_hook: RwLock<Option<AmbiguityHook>>,
}

/// The engine registry and query entry point.
///
/// Cloning is cheap; clones share the same registries. Engine internals
/// receive an explicit `Graph`; there is no process-wide instance inside
/// the engine.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph {
            inner: Arc::new(GraphInner {
                graph_id: format!("graph-{}", random_hex(6)),
                modules: RwLock::new(Vec::new()),
                next_module_id: AtomicU64::new(1),
                next_table_id: AtomicU64::new(1),
                next_provider_id: AtomicU64::new(1),
                tables_by_name: DashMap::new(),
                custom_verbs: DashMap::new(),
                providers: DashMap::new(),
                plan_cache: Mutex::new(None),
                enable_overprovide_filter: AtomicBool::new(false),
                schema_listeners: Mutex::new(Vec::new()),
                resources: DashMap::new(),
                ambiguity_hook: RwLock::new(None),
            }),
        }
    }

    pub fn graph_id(&self) -> &str {
        &self.inner.graph_id
    }

    // Module setup //

    /// Create a module with no points yet.
    pub fn create_empty_module(&self) -> Module {
        let module = Module::new(self.inner.next_module_id.fetch_add(1, Ordering::SeqCst));
        self.inner.modules.write().push(module.clone());
        module
    }

    /// Mount a group of points as a new module.
    pub fn mount(&self, points: Vec<MountPointSpec>) -> Result<Module, Error> {
        let module = self.create_empty_module();
        self.redefine_module(&module, points)?;
        Ok(module)
    }

    /// Atomically replace a module's points; invalidates plan caches and
    /// notifies schema listeners.
    pub fn redefine_module(
        &self,
        module: &Module,
        points: Vec<MountPointSpec>,
    ) -> Result<(), Error> {
        module.replace_points(points)?;
        self.on_module_change(module.module_id());
        Ok(())
    }

    /// Every mount point, in module registration order.
    pub fn every_mount_point(&self) -> Vec<Arc<MountPoint>> {
        self.inner
            .modules
            .read()
            .iter()
            .flat_map(|m| m.points())
            .collect()
    }

    /// Resolve a tuple to the best-fitting mount point. Ambiguous ties
    /// warn (tracing plus the optional hook) and keep the first found.
    pub fn find_best_match(&self, tuple: &QueryTuple) -> Option<Arc<MountPoint>> {
        let points = self.every_mount_point();
        let result = find_best_match(&points, tuple);

        if result.ambiguous {
            let query = tuple.to_query_string();
            tracing::warn!(query = %query, "multiple mount points tied for best match");
            if let Some(hook) = self.inner.ambiguity_hook.read().clone() {
                hook(&query);
            }
        }

        result.point
    }

    /// Install a hook invoked (with the query string) on ambiguous
    /// matches.
    pub fn set_ambiguity_hook<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.inner.ambiguity_hook.write() = Some(Arc::new(hook));
    }

    // Table setup //

    /// Create a table from a schema and mount it. Unnamed schemas get a
    /// generated name.
    pub fn new_table(&self, schema: TableSchema) -> Result<Arc<Table>, Error> {
        let schema = if schema.name.is_some() {
            schema
        } else {
            let id = self.inner.next_table_id.fetch_add(1, Ordering::SeqCst);
            schema.with_name(format!("table-{id}"))
        };
        let table = Table::new(schema);
        self.add_table(table.clone(), TableMountConfig::default())?;
        Ok(table)
    }

    /// Register and mount an existing table.
    pub fn add_table(&self, table: Arc<Table>, config: TableMountConfig) -> Result<(), Error> {
        let name = table.name().to_string();
        if self.inner.tables_by_name.contains_key(&name) {
            return Err(Error::InvalidData(format!(
                "already have a table named: {name}"
            )));
        }
        self.inner.tables_by_name.insert(name, table.clone());
        self.mount(table_mount_points(&table, &config))?;
        Ok(())
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.inner.tables_by_name.get(name).map(|t| t.value().clone())
    }

    // Custom verbs //

    pub fn add_custom_verb(&self, name: impl Into<String>, callback: NativeCallback) {
        self.inner.custom_verbs.insert(name.into(), callback);
        self.on_module_change(0);
    }

    pub fn custom_verb(&self, name: &str) -> Option<NativeCallback> {
        self.inner.custom_verbs.get(name).map(|v| v.value().clone())
    }

    // Providers //

    /// Register a provider; returns its generated id.
    pub fn add_provider<F>(&self, run_query: F) -> String
    where
        F: Fn(Query, Stream) -> Stream + Send + Sync + 'static,
    {
        let id = format!(
            "provider-{}",
            self.inner.next_provider_id.fetch_add(1, Ordering::SeqCst)
        );
        self.inner
            .providers
            .insert(id.clone(), Provider::new(id.clone(), Arc::new(run_query)));
        self.on_module_change(0);
        id
    }

    pub fn provider(&self, provider_id: &str) -> Option<Provider> {
        self.inner.providers.get(provider_id).map(|p| p.value().clone())
    }

    // Configuration //

    /// Turn on the plan cache (keyed by canonical query string).
    pub fn enable_plan_cache(&self) {
        let mut cache = self.inner.plan_cache.lock();
        if cache.is_none() {
            *cache = Some(HashMap::new());
        }
    }

    pub fn plan_cache_enabled(&self) -> bool {
        self.inner.plan_cache.lock().is_some()
    }

    /// Turn on overprovision detection for `get` plans.
    pub fn enable_overprovide_filter(&self, enabled: bool) {
        self.inner
            .enable_overprovide_filter
            .store(enabled, Ordering::SeqCst);
    }

    pub fn overprovide_filter_enabled(&self) -> bool {
        self.inner.enable_overprovide_filter.load(Ordering::SeqCst)
    }

    // Listeners & resources //

    /// Register a schema listener; with `backlog`, it is called for every
    /// existing module first.
    pub fn add_schema_listener<F>(&self, listener: F, backlog: bool)
    where
        F: Fn(&SchemaChange) + Send + Sync + 'static,
    {
        if backlog {
            for module in self.inner.modules.read().iter() {
                listener(&SchemaChange {
                    module_id: module.module_id(),
                });
            }
        }
        self.inner.schema_listeners.lock().push(Arc::new(listener));
    }

    /// Plan caches go stale on any registration change.
    pub(crate) fn on_module_change(&self, module_id: u64) {
        if let Some(cache) = self.inner.plan_cache.lock().as_mut() {
            cache.clear();
        }

        let listeners: Vec<SchemaListener> = self.inner.schema_listeners.lock().clone();
        let change = SchemaChange { module_id };
        for listener in listeners {
            listener(&change);
        }
    }

    /// Track a stream opened on behalf of an external connection.
    pub fn track_resource(&self, tags: &[String], stream: &Stream) {
        for tag in tags {
            self.inner
                .resources
                .entry(tag.clone())
                .or_default()
                .push(stream.clone());
        }
    }

    /// Close every stream opened under a resource tag (connection
    /// teardown). Producers see the stop condition; consumers see `done`.
    pub fn close_resources(&self, tag: &str) {
        if let Some((_, streams)) = self.inner.resources.remove(tag) {
            for stream in streams {
                stream.stop();
                stream.send_done_if_needed();
            }
        }
    }

    // Query //

    /// Compile and execute a query with default context.
    pub fn query(
        &self,
        query: impl Into<Query>,
        params: QueryParameters,
    ) -> Result<Stream, Error> {
        self.query_with_context(query, params, QueryExecutionContext::default())
    }

    /// Compile and execute a query. A supplied input stream turns the
    /// query into a transform. Returns the output stream; data errors
    /// arrive in-band.
    pub fn query_with_context(
        &self,
        query: impl Into<Query>,
        params: QueryParameters,
        context: QueryExecutionContext,
    ) -> Result<Stream, Error> {
        let mut query = query.into();
        if params.input.is_some() && !query.is_transform() {
            query = query.transform();
        }

        let plan = self.compile_cached(&query, &context)?;

        let input = params
            .input
            .clone()
            .unwrap_or_else(Stream::new_empty);
        let output = Stream::with_label(plan.query_string().to_string());
        plan.execute(params, input, output.clone());
        Ok(output)
    }

    fn compile_cached(
        &self,
        query: &Query,
        context: &QueryExecutionContext,
    ) -> Result<MultiStepPlan, Error> {
        if self.plan_cache_enabled() {
            let key = query.to_query_string();
            if let Some(cached) = self
                .inner
                .plan_cache
                .lock()
                .as_ref()
                .and_then(|c| c.get(&key).cloned())
            {
                return Ok(cached);
            }

            let plan = MultiStepPlan::compile(self, context, query)?;
            if let Some(cache) = self.inner.plan_cache.lock().as_mut() {
                cache.insert(key, plan.clone());
            }
            return Ok(plan);
        }

        MultiStepPlan::compile(self, context, query)
    }

    /// Run a query and resolve its first item.
    pub async fn query_one(
        &self,
        query: impl Into<Query>,
        params: QueryParameters,
    ) -> Result<Item, Error> {
        self.query(query, params)?.one_item().await
    }

    /// Run a transform over a list of items.
    pub fn transform(
        &self,
        items: Vec<Item>,
        query: impl Into<Query>,
    ) -> Result<Stream, Error> {
        let query = query.into();
        let query = if query.is_transform() {
            query
        } else {
            query.transform()
        };
        let params = QueryParameters::new().with_input(Stream::from_items(items));
        self.query(query, params)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("graph_id", &self.inner.graph_id)
            .field("modules", &self.inner.modules.read().len())
            .field("tables", &self.inner.tables_by_name.len())
            .finish()
    }
}

fn random_hex(length: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}
