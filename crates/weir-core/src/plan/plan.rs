//! Per-step plan compilation and execution.
//!
//! Compilation is pure and produces an immutable [`Plan`]; a plan is
//! re-executable any number of times without recompilation. Data errors
//! (no matching mount, missing parameters, callback failures) surface as
//! stream events at execution time; contract errors (empty tuple, a
//! schema-only dry run that suspends) fail compilation.

use std::sync::Arc;

use crate::error::{Error, ErrorItem, ErrorKind};
use crate::exec::{run_native_callback, NativeCallback, Task, TaskSetup};
use crate::graph::{Graph, QueryExecutionContext};
use crate::mount::MountPoint;
use crate::plan::filters::apply_filter;
use crate::plan::join::complete_join_verb;
use crate::plan::{OutputAttr, OutputFilter};
use crate::query::{QueryParameters, QueryTuple};
use crate::stream::Stream;
use crate::value::Item;
use crate::verbs;

/// The statically known shape of a step's input or output.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedValue {
    /// No input stream expected.
    NoValue,
    /// Some input arrives, shape unknown.
    SomeValue,
    /// Items are expected to carry this tuple's attrs.
    Single(QueryTuple),
    /// Items may carry any of these shapes.
    Union(Vec<QueryTuple>),
}

#[derive(Clone)]
pub(crate) struct PlanInner {
    pub graph: Graph,
    pub context: QueryExecutionContext,
    /// The step as written, verb tag included.
    pub tuple: QueryTuple,
    pub verb: String,
    /// The step's payload: the tuple minus an explicit verb tag.
    pub after_verb: QueryTuple,
    pub expected_input: ExpectedValue,
    pub expected_output: ExpectedValue,
    pub point: Option<Arc<MountPoint>>,
    /// Parameter names that must be present before the callback runs.
    pub check_required_params: Vec<String>,
    /// Attrs the query values but the matched point can't filter by.
    pub overprovided_attrs: Vec<String>,
    pub output_schema: Option<Item>,
    pub callback: Option<NativeCallback>,
    pub output_filters: Vec<OutputFilter>,
    /// Matching failed; execution short-circuits to this error.
    pub known_error: Option<ErrorItem>,
}

/// A compiled, immutable per-step execution plan.
#[derive(Clone)]
pub struct Plan {
    inner: Arc<PlanInner>,
}

impl Plan {
    /// Compile one query-tuple step against the graph's mount points.
    pub fn compile(
        graph: &Graph,
        context: &QueryExecutionContext,
        tuple: QueryTuple,
        expected_input: ExpectedValue,
    ) -> Result<Plan, Error> {
        let resolved = resolve_verb(graph, &tuple, &expected_input)?;

        let mut inner = PlanInner {
            graph: graph.clone(),
            context: context.clone(),
            tuple,
            verb: resolved.name,
            after_verb: resolved.after_verb,
            expected_input,
            expected_output: ExpectedValue::SomeValue,
            point: None,
            check_required_params: Vec::new(),
            overprovided_attrs: Vec::new(),
            output_schema: None,
            callback: resolved.callback,
            output_filters: Vec::new(),
            known_error: None,
        };

        match inner.verb.as_str() {
            "get" => complete_get_verb(&mut inner, graph)?,
            "join" => complete_join_verb(&mut inner, graph, context)?,
            _ => {
                inner.expected_output = expected_output_from_dry_run(&inner)?;
            }
        }

        Ok(Plan::from_inner(inner))
    }

    /// Compile to the mutable form, for callers (the join planner) that
    /// adjust the filter chain before freezing.
    pub(crate) fn compile_parts(
        graph: &Graph,
        context: &QueryExecutionContext,
        tuple: QueryTuple,
        expected_input: ExpectedValue,
    ) -> Result<PlanInner, Error> {
        let plan = Plan::compile(graph, context, tuple, expected_input)?;
        Ok((*plan.inner).clone())
    }

    pub(crate) fn from_inner(inner: PlanInner) -> Plan {
        Plan {
            inner: Arc::new(inner),
        }
    }

    pub fn verb(&self) -> &str {
        &self.inner.verb
    }

    pub fn expected_output(&self) -> &ExpectedValue {
        &self.inner.expected_output
    }

    pub fn known_error(&self) -> Option<&ErrorItem> {
        self.inner.known_error.as_ref()
    }

    pub fn output_schema(&self) -> Option<&Item> {
        self.inner.output_schema.as_ref()
    }

    pub fn point(&self) -> Option<&Arc<MountPoint>> {
        self.inner.point.as_ref()
    }

    pub fn output_filters(&self) -> &[OutputFilter] {
        &self.inner.output_filters
    }

    /// Execute against live streams. Never fails: data errors are
    /// delivered in-band on `output`.
    pub fn execute(&self, parameters: QueryParameters, input: Stream, output: Stream) {
        execute_plan_inner(&self.inner, parameters, input, output, false);
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("verb", &self.inner.verb)
            .field("tuple", &self.inner.tuple.to_query_string())
            .field("point", &self.inner.point.as_ref().map(|p| p.decl_string()))
            .field("known_error", &self.inner.known_error)
            .finish()
    }
}

struct ResolvedVerb {
    name: String,
    after_verb: QueryTuple,
    callback: Option<NativeCallback>,
}

/// The step's first tag selects a verb: built-in verbs, then custom
/// verbs, then a default: `get` when no input is expected, `join` when
/// input is expected.
fn resolve_verb(
    graph: &Graph,
    tuple: &QueryTuple,
    expected_input: &ExpectedValue,
) -> Result<ResolvedVerb, Error> {
    let Some(first) = tuple.first() else {
        return Err(Error::InvalidQuery("empty query tuple".to_string()));
    };
    let verb_name = first.attr.clone();

    if verb_name == "get" || verb_name == "join" {
        return Ok(ResolvedVerb {
            name: verb_name,
            after_verb: tuple.without_first_tag(),
            callback: None,
        });
    }

    if let Some(callback) = verbs::find_builtin(&verb_name) {
        return Ok(ResolvedVerb {
            name: verb_name,
            after_verb: tuple.without_first_tag(),
            callback: Some(callback),
        });
    }

    if let Some(callback) = graph.custom_verb(&verb_name) {
        return Ok(ResolvedVerb {
            name: verb_name,
            after_verb: tuple.without_first_tag(),
            callback: Some(callback),
        });
    }

    // No verb tag: the whole tuple is the payload.
    match expected_input {
        ExpectedValue::NoValue => Ok(ResolvedVerb {
            name: "get".to_string(),
            after_verb: tuple.clone(),
            callback: None,
        }),
        _ => Ok(ResolvedVerb {
            name: "join".to_string(),
            after_verb: tuple.clone(),
            callback: None,
        }),
    }
}

/// Complete a `get` plan: match, classify attrs, build the filter chain.
fn complete_get_verb(inner: &mut PlanInner, graph: &Graph) -> Result<(), Error> {
    let Some(point) = graph.find_best_match(&inner.after_verb) else {
        inner.expected_output = ExpectedValue::SomeValue;
        inner.known_error = Some(
            ErrorItem::new(
                ErrorKind::NoTableFound,
                format!(
                    "no mount point matched: {}",
                    inner.after_verb.to_query_string()
                ),
            )
            .with_query(inner.tuple.to_query_string()),
        );
        return Ok(());
    };

    let callback = point
        .callback()
        .cloned()
        .ok_or_else(|| Error::InvalidData(format!(
            "mount point has no callback: {}",
            point.decl_string()
        )))?;

    let mut shape: Vec<OutputAttr> = Vec::new();
    let mut overprovided_filter_attrs: Vec<OutputAttr> = Vec::new();

    for tag in inner.after_verb.tags() {
        let attr = &tag.attr;
        let mount_attr = point.get_attr(attr);
        let provides_value = tag.provides_value();
        let provided_value = if provides_value {
            Some(tag.value.unwrap()?)
        } else {
            None
        };
        let will_have_value = provides_value || tag.identifier.is_some();
        let param_name = tag.identifier.clone().unwrap_or_else(|| attr.clone());

        let requires_param = match mount_attr {
            Some(config) if config.requires_value && !provides_value => true,
            _ => tag.identifier.is_some() && !provides_value,
        };
        if requires_param {
            inner.check_required_params.push(param_name.clone());
        }

        if graph.overprovide_filter_enabled() {
            if let Some(config) = mount_attr {
                if will_have_value && !config.requires_value && !config.accepts_value {
                    inner.overprovided_attrs.push(attr.clone());
                    overprovided_filter_attrs.push(match &provided_value {
                        Some(value) => OutputAttr::Constant {
                            attr: attr.clone(),
                            value: value.clone(),
                        },
                        None => OutputAttr::FromParam {
                            attr: attr.clone(),
                            param: param_name.clone(),
                        },
                    });
                }
            }
        }

        if mount_attr.is_none() {
            // The query has an optional tag the mount doesn't provide.
            continue;
        }

        shape.push(match provided_value {
            Some(value) => OutputAttr::Constant {
                attr: attr.clone(),
                value,
            },
            None if will_have_value => OutputAttr::FromParam {
                attr: attr.clone(),
                param: param_name,
            },
            None => OutputAttr::FromItem { attr: attr.clone() },
        });
    }

    inner.output_filters.push(OutputFilter::Reshape { shape });
    if !overprovided_filter_attrs.is_empty() {
        inner.output_filters.push(OutputFilter::WhereAttrsEqual {
            attrs: overprovided_filter_attrs,
        });
    }

    inner.expected_output = ExpectedValue::Single(inner.after_verb.clone());
    inner.output_schema = Some(inner.after_verb.to_item());
    inner.point = Some(point);
    inner.callback = Some(callback);
    Ok(())
}

/// Learn an alt verb's output shape by running it once in schema-only
/// mode. The run must complete synchronously; a verb that suspends is a
/// contract violation and fails compilation.
fn expected_output_from_dry_run(inner: &PlanInner) -> Result<ExpectedValue, Error> {
    let input = Stream::new();
    match &inner.expected_input {
        ExpectedValue::Single(tuple) => {
            let _ = input.put(tuple.to_item());
        }
        ExpectedValue::Union(tuples) => {
            for tuple in tuples {
                let _ = input.put(tuple.to_item());
            }
        }
        _ => {}
    }
    let _ = input.done();

    let output = Stream::new();
    execute_plan_inner(inner, QueryParameters::new(), input, output.clone(), true);

    if !output.is_done() {
        return Err(Error::DryRunSuspended(inner.verb.clone()));
    }

    let (items, _errors) = output.take_items_and_errors();
    Ok(match items.len() {
        0 => ExpectedValue::NoValue,
        1 => ExpectedValue::Single(QueryTuple::from_item(&items[0])),
        _ => ExpectedValue::Union(items.iter().map(QueryTuple::from_item).collect()),
    })
}

/// The shared execution path, used by live runs and schema-only dry runs.
pub(crate) fn execute_plan_inner(
    inner: &PlanInner,
    parameters: QueryParameters,
    input: Stream,
    output: Stream,
    schema_only: bool,
) {
    if let Some(known_error) = &inner.known_error {
        let _ = output.put_error(known_error.clone());
        output.send_done_if_needed();
        return;
    }

    for param in &inner.check_required_params {
        if !parameters.has(param) {
            let _ = output.put_error(
                ErrorItem::new(
                    ErrorKind::MissingParameter,
                    format!("missing parameter: {param}"),
                )
                .with_query(inner.tuple.to_query_string()),
            );
            output.send_done_if_needed();
            return;
        }
    }

    let overprovision_active = !inner.overprovided_attrs.is_empty();
    let mut task_output = output;
    for filter in &inner.output_filters {
        task_output = apply_filter(filter, &parameters, overprovision_active, task_output);
    }

    let task = Task::new(TaskSetup {
        graph: inner.graph.clone(),
        tuple: inner.tuple.clone(),
        after_verb: inner.after_verb.clone(),
        parameters,
        input,
        output: task_output,
        context: inner.context.clone(),
        schema_only,
    });

    if inner.verb != "get" {
        // Verbs own their output lifecycle.
        task.declare_streaming();
    }

    if let Some(schema) = &inner.output_schema {
        let _ = task.output().put_schema(schema.clone());
    }

    let Some(callback) = &inner.callback else {
        let _ = task.output().put_error(
            ErrorItem::new(ErrorKind::Exception, "plan has no callback".to_string())
                .with_query(inner.tuple.to_query_string()),
        );
        task.output().send_done_if_needed();
        return;
    };

    run_native_callback(&task, callback);
}

/// Compile and execute a nested step at runtime, on behalf of a verb.
/// Schema-only tasks emit the nested plan's schema and finish without
/// side effects.
pub(crate) fn runtime_plan_and_execute(
    task: &Task,
    tuple: QueryTuple,
    output: Stream,
) -> Result<(), Error> {
    let plan = Plan::compile(task.graph(), task.context(), tuple, ExpectedValue::NoValue)?;

    if task.schema_only() {
        if let Some(schema) = plan.output_schema() {
            let _ = output.put_schema(schema.clone());
        }
        output.send_done_if_needed();
        return Ok(());
    }

    plan.execute(task.parameters().clone(), Stream::new_empty(), output);
    Ok(())
}
