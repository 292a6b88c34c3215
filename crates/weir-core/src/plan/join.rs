//! Join planning: static (shared sub-plan) and dynamic (per-item) joins.

use crate::error::{Error, ErrorItem};
use crate::exec::{native_callback, CallbackOutput, Task};
use crate::graph::{Graph, QueryExecutionContext};
use crate::plan::plan::PlanInner;
use crate::plan::{ExpectedValue, OutputAttr, OutputFilter, Plan};
use crate::query::{QueryParameters, QueryTag};
use crate::stream::{Stream, StreamEvent, StreamingTransformOptions};
use crate::value::{Item, TaggedValue};

/// Complete a `join` plan.
///
/// A static join is attempted first: the left-hand input's expected shape
/// supplies optional identifier-bound tags for a synthetic search tuple;
/// when the matcher resolves it, one shared sub-plan serves every left
/// item. Without a static match the join falls back to dynamic mode and
/// compiles a fresh sub-plan per left item from its actual values.
pub(crate) fn complete_join_verb(
    inner: &mut PlanInner,
    graph: &Graph,
    context: &QueryExecutionContext,
) -> Result<(), Error> {
    let expected_lhs = inner.expected_input.clone();

    let mut rhs_search = inner.after_verb.clone();
    if let ExpectedValue::Single(lhs_tuple) = &expected_lhs {
        for lhs_tag in lhs_tuple.tags() {
            rhs_search.add_or_overwrite_tag(QueryTag {
                attr: lhs_tag.attr.clone(),
                value: lhs_tag.value.clone(),
                identifier: Some(lhs_tag.attr.clone()),
                is_optional: true,
            });
        }
    }

    let static_point = graph.find_best_match(&rhs_search);

    if static_point.is_some() {
        let mut rhs_inner =
            Plan::compile_parts(graph, context, rhs_search.clone(), ExpectedValue::NoValue)?;

        // Carry the left shape's attrs through the sub-plan's reshape so
        // joined items keep their left-hand values; skip attrs the shape
        // already produces.
        if let ExpectedValue::Single(lhs_tuple) = &expected_lhs {
            let Some(OutputFilter::Reshape { shape }) = rhs_inner
                .output_filters
                .iter_mut()
                .find(|f| matches!(f, OutputFilter::Reshape { .. }))
            else {
                return Err(Error::InvalidState(
                    "join sub-plan has no reshape filter".to_string(),
                ));
            };

            for lhs_tag in lhs_tuple.tags() {
                if !shape.iter().any(|a| a.attr() == lhs_tag.attr) {
                    shape.push(OutputAttr::FromItem {
                        attr: lhs_tag.attr.clone(),
                    });
                }
            }
        }

        let rhs_plan = Plan::from_inner(rhs_inner);
        inner.callback = Some(native_callback(move |task: &Task| {
            let rhs_plan = rhs_plan.clone();
            let parameters = task.parameters().clone();
            task.input().streaming_transform(
                task.output().clone(),
                move |lhs_item: Item| execute_join_rhs(&rhs_plan, &parameters, &lhs_item),
                StreamingTransformOptions::default(),
            );
            Ok(CallbackOutput::None)
        }));
        inner.expected_output = ExpectedValue::Single(rhs_search);
    } else {
        let graph = graph.clone();
        let context = context.clone();
        let payload = inner.after_verb.clone();

        inner.callback = Some(native_callback(move |task: &Task| {
            let graph = graph.clone();
            let context = context.clone();
            let payload = payload.clone();
            let parameters = task.parameters().clone();

            task.input().streaming_transform(
                task.output().clone(),
                move |lhs_item: Item| {
                    let mut rhs_search = payload.clone();
                    for (attr, value) in lhs_item.iter() {
                        rhs_search.add_or_overwrite_tag(QueryTag {
                            attr: attr.to_string(),
                            value: TaggedValue::from_value(value),
                            identifier: Some(attr.to_string()),
                            is_optional: true,
                        });
                    }

                    match Plan::compile(&graph, &context, rhs_search, ExpectedValue::NoValue) {
                        Ok(plan) => execute_join_rhs(&plan, &parameters, &lhs_item),
                        Err(err) => {
                            let out = Stream::new();
                            let _ = out.put_error(ErrorItem::from_error(&err, None));
                            let _ = out.done();
                            out
                        }
                    }
                },
                StreamingTransformOptions::default(),
            );
            Ok(CallbackOutput::None)
        }));
        inner.expected_output = ExpectedValue::SomeValue;
    }

    Ok(())
}

/// Run a join sub-plan for one left item: the item's values layer under
/// the caller's parameters, and any output attr that resolved null is
/// filled from the left item.
fn execute_join_rhs(rhs_plan: &Plan, parameters: &QueryParameters, lhs_item: &Item) -> Stream {
    let output = Stream::new();

    let forward = output.clone();
    let lhs = lhs_item.clone();
    let plan_output = Stream::to_receiver(move |event: StreamEvent| match event {
        StreamEvent::Item { item } => {
            let mut fixed = item;
            let null_attrs: Vec<String> = fixed
                .iter()
                .filter(|(_, v)| v.is_null())
                .map(|(a, _)| a.to_string())
                .collect();
            for attr in null_attrs {
                if let Some(value) = lhs.get(&attr) {
                    fixed.set(attr, value.clone());
                }
            }
            forward.put(fixed)
        }
        other => forward.receive(other),
    });

    rhs_plan.execute(
        parameters.layered_under(lhs_item),
        Stream::new_empty(),
        plan_output,
    );

    output
}
