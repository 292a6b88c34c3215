//! The live execution context for one plan-step invocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, ErrorItem};
use crate::graph::{Graph, QueryExecutionContext};
use crate::query::{Query, QueryParameters, QueryTuple};
use crate::stream::Stream;
use crate::value::{Item, Value};

#[derive(Default)]
struct TaskFlags {
    declared_async: AtomicBool,
    declared_streaming: AtomicBool,
}

/// Everything needed to start a task.
pub struct TaskSetup {
    pub graph: Graph,
    pub tuple: QueryTuple,
    pub after_verb: QueryTuple,
    pub parameters: QueryParameters,
    pub input: Stream,
    pub output: Stream,
    pub context: QueryExecutionContext,
    pub schema_only: bool,
}

/// One plan-step execution: the parameter-injected tuple, the live
/// input/output streams, and helpers callbacks use to read arguments,
/// run nested queries, and emit output.
///
/// Cloning is cheap and clones share the async/streaming declarations, so
/// a continuation spawned for a future sees flags set by the callback.
#[derive(Clone)]
pub struct Task {
    graph: Graph,
    tuple: QueryTuple,
    tuple_without_params: QueryTuple,
    after_verb: QueryTuple,
    parameters: QueryParameters,
    input: Stream,
    output: Stream,
    context: QueryExecutionContext,
    schema_only: bool,
    flags: Arc<TaskFlags>,
}

impl Task {
    pub(crate) fn new(setup: TaskSetup) -> Task {
        let tuple = setup.tuple.inject_parameters(&setup.parameters);
        Task {
            graph: setup.graph,
            tuple_without_params: setup.tuple,
            after_verb: setup.after_verb,
            tuple,
            parameters: setup.parameters,
            input: setup.input,
            output: setup.output,
            context: setup.context,
            schema_only: setup.schema_only,
            flags: Arc::new(TaskFlags::default()),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The parameter-injected tuple this task executes.
    pub fn tuple(&self) -> &QueryTuple {
        &self.tuple
    }

    /// The tuple as written, before parameter injection. Used for error
    /// context so messages show the caller's query.
    pub fn tuple_without_params(&self) -> &QueryTuple {
        &self.tuple_without_params
    }

    /// The tuple minus the verb tag: the verb's arguments.
    pub fn after_verb(&self) -> &QueryTuple {
        &self.after_verb
    }

    pub fn parameters(&self) -> &QueryParameters {
        &self.parameters
    }

    pub fn input(&self) -> &Stream {
        &self.input
    }

    pub fn output(&self) -> &Stream {
        &self.output
    }

    pub fn context(&self) -> &QueryExecutionContext {
        &self.context
    }

    /// Whether this is a schema-only dry run: placeholder input, no side
    /// effects, must complete synchronously.
    pub fn schema_only(&self) -> bool {
        self.schema_only
    }

    pub fn has(&self, attr: &str) -> bool {
        self.tuple.has(attr)
    }

    pub fn has_value(&self, attr: &str) -> bool {
        self.tuple
            .get_attr(attr)
            .map(|tag| tag.provides_value())
            .unwrap_or(false)
    }

    /// The value for an attr; fails with [`Error::MissingValue`] when the
    /// tag is absent or carries no value.
    pub fn get(&self, attr: &str) -> Result<Value, Error> {
        let tag = self
            .tuple
            .get_attr(attr)
            .ok_or_else(|| Error::MissingValue(attr.to_string()))?;
        if !tag.provides_value() {
            return Err(Error::MissingValue(attr.to_string()));
        }
        tag.value.unwrap()
    }

    /// The value for an attr, or a default.
    pub fn get_optional(&self, attr: &str, default: Value) -> Value {
        match self.tuple.get_attr(attr) {
            Some(tag) if tag.provides_value() => tag.value.unwrap().unwrap_or(default),
            _ => default,
        }
    }

    /// The value for an attr as a string.
    pub fn get_string(&self, attr: &str) -> Result<String, Error> {
        Ok(self.get(attr)?.canonical_string())
    }

    /// The value for an attr parsed as an integer.
    pub fn get_int(&self, attr: &str) -> Result<i64, Error> {
        let value = self.get(attr)?;
        value
            .as_i64()
            .ok_or_else(|| Error::InvalidData(format!("not an integer: {attr}")))
    }

    /// A context environment value.
    pub fn get_env(&self, name: &str) -> Option<&Value> {
        self.context.env.get(name)
    }

    /// The verb's arguments as an item: every after-verb attr mapped to
    /// its resolved value (null when absent).
    pub fn args(&self) -> Item {
        let mut out = Item::new();
        for tag in self.after_verb.tags() {
            out.set(
                tag.attr.clone(),
                self.get_optional(&tag.attr, Value::Null),
            );
        }
        out
    }

    /// Run a nested query bound to the same graph and context.
    pub fn query(
        &self,
        query: impl Into<Query>,
        parameters: QueryParameters,
    ) -> Result<Stream, Error> {
        self.graph
            .query_with_context(query, parameters, self.context.clone())
    }

    /// Run a nested query over the verb's arguments plus extra presence
    /// attrs (e.g. `listener-stream`).
    pub fn query_related(
        &self,
        with: &[&str],
        parameters: QueryParameters,
    ) -> Result<Stream, Error> {
        let mut tuple = self.after_verb.clone();
        for attr in with {
            tuple.add_or_overwrite_tag(crate::query::QueryTag::new(*attr));
        }
        self.query(tuple, parameters)
    }

    /// Emit an item on the output.
    pub fn put(&self, item: Item) -> Result<(), Error> {
        self.output.put(item)
    }

    /// Emit an in-band error on the output.
    pub fn put_error(&self, error: ErrorItem) -> Result<(), Error> {
        self.output.put_error(error)
    }

    /// Emit a header on the output.
    pub fn put_header(&self, item: Item) -> Result<(), Error> {
        self.output.put_header(item)
    }

    /// Terminate the output.
    pub fn done(&self) {
        self.output.send_done_if_needed();
    }

    /// Declare that this callback completes asynchronously; the automatic
    /// `done` after the synchronous return is suppressed.
    pub fn declare_async(&self) {
        self.flags.declared_async.store(true, Ordering::SeqCst);
    }

    /// Declare that this callback streams its own output and owns `done`.
    pub fn declare_streaming(&self) {
        self.flags.declared_streaming.store(true, Ordering::SeqCst);
    }

    pub fn declared_async(&self) -> bool {
        self.flags.declared_async.load(Ordering::SeqCst)
    }

    pub fn declared_streaming(&self) -> bool {
        self.flags.declared_streaming.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("tuple", &self.tuple.to_query_string())
            .field("schema_only", &self.schema_only)
            .finish()
    }
}
