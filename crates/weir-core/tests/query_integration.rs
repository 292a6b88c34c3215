//! Integration tests for the planner and streaming runtime.

use std::sync::Arc;

use parking_lot::Mutex;

use weir_core::{
    native_callback, AttrConfig, CallbackOutput, Error, ErrorKind, GenerateConfig, GenerateMethod,
    Graph, Item, MountAttr, MountPointSpec, OnConflict, QueryExecutionContext, QueryParameters,
    QueryTag, QueryTuple, Stream, StreamEvent, TableSchema, TaggedValue, Task, Value,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn items_of(events: &[StreamEvent]) -> Vec<Item> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Item { item } => Some(item.clone()),
            _ => None,
        })
        .collect()
}

fn errors_of(events: &[StreamEvent]) -> Vec<weir_core::ErrorItem> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Error { error } => Some(error.clone()),
            _ => None,
        })
        .collect()
}

/// A mount producing `b = a * 10`, requiring a value for `a`.
fn a_to_b_mount() -> MountPointSpec {
    MountPointSpec::new()
        .attr(
            "a",
            MountAttr::new().required().requires_value().accepts_value(),
        )
        .attr("b", MountAttr::new().output())
        .with_callback(native_callback(|task: &Task| {
            let a = task.get_int("a")?;
            Ok(CallbackOutput::Item(Item::new().with("b", a * 10)))
        }))
}

#[tokio::test]
async fn test_get_from_table() {
    init_logging();
    let graph = Graph::new();
    let table = graph
        .new_table(
            TableSchema::new()
                .with_name("users")
                .with_attr(
                    "id",
                    AttrConfig::new().generate(GenerateConfig::new(GenerateMethod::Increment)),
                )
                .with_attr("name", AttrConfig::new().indexed()),
        )
        .unwrap();

    table.put(Item::new().with("name", "ada")).unwrap();
    table.put(Item::new().with("name", "grace")).unwrap();

    let out = graph
        .query(
            QueryTuple::new().with_attr("id").with_attr("name"),
            QueryParameters::new(),
        )
        .unwrap();
    let (items, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get("name").unwrap().as_str(), Some("ada"));
    assert_eq!(items[0].get("id").unwrap().as_i64(), Some(1));
}

#[tokio::test]
async fn test_get_with_filter_value() {
    let graph = Graph::new();
    let table = graph
        .new_table(
            TableSchema::new()
                .with_name("colors")
                .with_attr("name", AttrConfig::new().indexed())
                .with_attr("hex", AttrConfig::new().optional()),
        )
        .unwrap();
    table
        .put(Item::new().with("name", "red").with("hex", "f00"))
        .unwrap();
    table
        .put(Item::new().with("name", "blue").with("hex", "00f"))
        .unwrap();

    let out = graph
        .query(
            QueryTuple::new()
                .with_value("name", "blue")
                .with_attr("hex"),
            QueryParameters::new(),
        )
        .unwrap();
    let (items, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("hex").unwrap().as_str(), Some("00f"));
    // The queried value is a constant in the output shape.
    assert_eq!(items[0].get("name").unwrap().as_str(), Some("blue"));
}

#[tokio::test]
async fn test_no_table_found_is_one_error_then_done() {
    let graph = Graph::new();

    let out = graph
        .query(
            QueryTuple::new().with_attr("nonexistent"),
            QueryParameters::new(),
        )
        .unwrap();
    let events = out.collect_events().await;

    let errors = errors_of(&events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::NoTableFound);
    assert!(items_of(&events).is_empty());
    assert!(events.last().unwrap().is_done());
}

#[tokio::test]
async fn test_missing_parameter_short_circuits() {
    let graph = Graph::new();
    graph.mount(vec![a_to_b_mount()]).unwrap();

    let tuple = QueryTuple::new()
        .with_tag(QueryTag::new("a").with_identifier("a"))
        .with_attr("b");

    // Without the parameter: one missing_parameter error, no callback run.
    let out = graph.query(tuple.clone(), QueryParameters::new()).unwrap();
    let events = out.collect_events().await;
    let errors = errors_of(&events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::MissingParameter);

    // With the parameter: the value resolves from params.
    let out = graph
        .query(tuple, QueryParameters::new().with("a", Value::Int(4)))
        .unwrap();
    let (items, errors) = out.collect_items().await;
    assert!(errors.is_empty());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("b").unwrap().as_i64(), Some(40));
    assert_eq!(items[0].get("a").unwrap().as_i64(), Some(4));
}

#[tokio::test]
async fn test_overprovision_filter_drops_mismatches() {
    let graph = Graph::new();
    graph.enable_overprovide_filter(true);

    // `a` is declared but the callback can't filter by it: the mount
    // always returns a=5 b=9.
    graph
        .mount(vec![MountPointSpec::new()
            .attr("a", MountAttr::new())
            .attr("b", MountAttr::new().output())
            .with_callback(native_callback(|_task: &Task| {
                Ok(CallbackOutput::Item(
                    Item::new().with("a", 5i64).with("b", 9i64),
                ))
            }))])
        .unwrap();

    let matching = graph
        .query(
            QueryTuple::new().with_value("a", "5").with_attr("b"),
            QueryParameters::new(),
        )
        .unwrap();
    let (items, _) = matching.collect_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("a").unwrap().canonical_string(), "5");
    assert_eq!(items[0].get("b").unwrap().as_i64(), Some(9));

    let mismatched = graph
        .query(
            QueryTuple::new().with_value("a", "6").with_attr("b"),
            QueryParameters::new(),
        )
        .unwrap();
    let (items, errors) = mismatched.collect_items().await;
    assert!(errors.is_empty());
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_static_join_preserves_order() {
    let graph = Graph::new();
    let lefts = graph
        .new_table(
            TableSchema::new()
                .with_name("lefts")
                .with_attr("a", AttrConfig::new().indexed()),
        )
        .unwrap();
    lefts.put(Item::new().with("a", 1i64)).unwrap();
    lefts.put(Item::new().with("a", 2i64)).unwrap();

    graph.mount(vec![a_to_b_mount()]).unwrap();

    let query = weir_core::Query::new(vec![
        QueryTuple::new().with_attr("a"),
        QueryTuple::new().with_attr("b"),
    ]);
    let out = graph.query(query, QueryParameters::new()).unwrap();
    let (items, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get("a").unwrap().as_i64(), Some(1));
    assert_eq!(items[0].get("b").unwrap().as_i64(), Some(10));
    assert_eq!(items[1].get("a").unwrap().as_i64(), Some(2));
    assert_eq!(items[1].get("b").unwrap().as_i64(), Some(20));
}

#[tokio::test]
async fn test_dynamic_join_when_shape_is_unknown() {
    let graph = Graph::new();
    graph.mount(vec![a_to_b_mount()]).unwrap();

    // `incoming` leaves the expected shape empty, so the join step can't
    // match statically and falls back to per-item planning.
    let query = weir_core::Query::new(vec![
        QueryTuple::new().with_attr("incoming"),
        QueryTuple::new().with_attr("b"),
    ]);

    let input = Stream::from_items(vec![
        Item::new().with("a", 1i64),
        Item::new().with("a", 2i64),
    ]);
    let out = graph
        .query(query, QueryParameters::new().with_input(input))
        .unwrap();
    let (items, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get("b").unwrap().as_i64(), Some(10));
    assert_eq!(items[1].get("b").unwrap().as_i64(), Some(20));
}

#[tokio::test]
async fn test_transform_verbs_pipeline() {
    let graph = Graph::new();

    let query = weir_core::Query::new(vec![
        QueryTuple::new().with_attr("rename").with_value("from", "a").with_value("to", "n"),
        QueryTuple::new().with_attr("with").with_value("tag", "x"),
        QueryTuple::new().with_attr("just").with_attr("n").with_attr("tag"),
        QueryTuple::new().with_attr("reverse"),
    ]);

    let out = graph
        .transform(
            vec![
                Item::new().with("a", 1i64).with("junk", 0i64),
                Item::new().with("a", 2i64),
            ],
            query,
        )
        .unwrap();
    let (items, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get("n").unwrap().as_i64(), Some(2));
    assert_eq!(items[0].get("tag").unwrap().as_str(), Some("x"));
    assert!(!items[0].has("junk"));
    assert_eq!(items[1].get("n").unwrap().as_i64(), Some(1));
}

#[tokio::test]
async fn test_value_then_verb() {
    let graph = Graph::new();

    let query = weir_core::Query::new(vec![
        QueryTuple::new().with_attr("value").with_value("a", "1"),
        QueryTuple::new()
            .with_attr("then")
            .with_attr("value")
            .with_value("b", "2"),
    ]);
    let out = graph.query(query, QueryParameters::new()).unwrap();
    let (items, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get("a").unwrap().canonical_string(), "1");
    assert_eq!(items[1].get("b").unwrap().canonical_string(), "2");
}

#[tokio::test]
async fn test_wait_verb_delays_but_delivers() {
    let graph = Graph::new();

    let query = weir_core::Query::new(vec![
        QueryTuple::new().with_attr("value").with_value("a", "1"),
        QueryTuple::new()
            .with_attr("wait")
            .with_value("duration", "10"),
    ]);
    let started = std::time::Instant::now();
    let out = graph.query(query, QueryParameters::new()).unwrap();
    let (items, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    assert_eq!(items.len(), 1);
    assert!(started.elapsed().as_millis() >= 10);
}

#[tokio::test]
async fn test_put_and_update_verbs_mutate_table() {
    let graph = Graph::new();
    let table = graph
        .new_table(
            TableSchema::new()
                .with_name("kv")
                .with_attr("k", AttrConfig::new().indexed())
                .with_attr("v", AttrConfig::new().optional()),
        )
        .unwrap();

    // put: each input item becomes a nested `put!`.
    let put_query = weir_core::Query::new(vec![QueryTuple::new().with_attr("put")]);
    let out = graph
        .transform(
            vec![Item::new().with("k", "a").with("v", 1i64)],
            put_query,
        )
        .unwrap();
    let (_, errors) = out.collect_items().await;
    assert!(errors.is_empty());
    assert_eq!(table.count(), 1);

    // update: filter by the flowing item, apply the verb's args.
    let update_query = weir_core::Query::new(vec![QueryTuple::new()
        .with_attr("update")
        .with_value("v", "9")]);
    let out = graph
        .transform(vec![Item::new().with("k", "a").with("v", 1i64)], update_query)
        .unwrap();
    let (_, errors) = out.collect_items().await;
    assert!(errors.is_empty());

    let row = table.one(&Item::new().with("k", "a")).unwrap();
    assert_eq!(row.get("v").unwrap().canonical_string(), "9");
}

#[tokio::test]
async fn test_custom_verb_and_plan_cache_invalidation() {
    let graph = Graph::new();
    graph.enable_plan_cache();

    graph.add_custom_verb(
        "double",
        native_callback(|task: &Task| {
            task.input()
                .transform(task.output().clone(), |mut item: Item| {
                    let n = item.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                    item.set("n", n * 2);
                    vec![item]
                });
            Ok(CallbackOutput::None)
        }),
    );

    let module = graph
        .mount(vec![MountPointSpec::new()
            .attr("n", MountAttr::new().output())
            .required_attr("numbers")
            .with_callback(native_callback(|_task: &Task| {
                Ok(CallbackOutput::Item(Item::new().with("n", 3i64)))
            }))])
        .unwrap();

    let query = weir_core::Query::new(vec![
        QueryTuple::new().with_attr("numbers").with_attr("n"),
        QueryTuple::new().with_attr("double"),
    ]);

    let out = graph.query(query.clone(), QueryParameters::new()).unwrap();
    let (items, _) = out.collect_items().await;
    assert_eq!(items[0].get("n").unwrap().as_i64(), Some(6));

    // Redefining the module must invalidate the cached plan.
    graph
        .redefine_module(
            &module,
            vec![MountPointSpec::new()
                .attr("n", MountAttr::new().output())
                .required_attr("numbers")
                .with_callback(native_callback(|_task: &Task| {
                    Ok(CallbackOutput::Item(Item::new().with("n", 100i64)))
                }))],
        )
        .unwrap();

    let out = graph.query(query, QueryParameters::new()).unwrap();
    let (items, _) = out.collect_items().await;
    assert_eq!(items[0].get("n").unwrap().as_i64(), Some(200));
}

#[tokio::test]
async fn test_provider_delegation_and_not_found() {
    let graph = Graph::new();

    let provider_id = graph.add_provider(|_query, _input| {
        Stream::from_items(vec![Item::new().with("remote", true)])
    });

    let nested = weir_core::Query::new(vec![QueryTuple::new().with_attr("anything")]);
    let tuple = QueryTuple::new()
        .with_attr("run_query_with_provider")
        .with_value("provider_id", provider_id)
        .with_tag(QueryTag::new("query").with_value(TaggedValue::Query(nested.clone())));

    let out = graph.query(tuple, QueryParameters::new()).unwrap();
    let (items, errors) = out.collect_items().await;
    assert!(errors.is_empty());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("remote").unwrap().as_bool(), Some(true));

    let missing = QueryTuple::new()
        .with_attr("run_query_with_provider")
        .with_value("provider_id", "provider-999")
        .with_tag(QueryTag::new("query").with_value(TaggedValue::Query(nested)));
    let out = graph.query(missing, QueryParameters::new()).unwrap();
    let (items, errors) = out.collect_items().await;
    assert!(items.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::ProviderNotFound);
}

#[tokio::test]
async fn test_listen_verb_streams_table_changes() {
    let graph = Graph::new();
    let table = graph
        .new_table(
            TableSchema::new()
                .with_name("events")
                .with_attr("name", AttrConfig::new().indexed()),
        )
        .unwrap();
    table.put(Item::new().with("name", "first")).unwrap();

    let out = graph
        .query(
            QueryTuple::new().with_attr("listen").with_attr("name"),
            QueryParameters::new(),
        )
        .unwrap();

    let seen: Arc<Mutex<Vec<StreamEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    out.send_to(move |event: StreamEvent| {
        sink.lock().push(event);
        Ok(())
    });

    // Let the listen future resolve, then trigger a live event.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    table.put(Item::new().with("name", "second")).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let events = seen.lock().clone();
    let items = items_of(&events);
    let names: Vec<&str> = items
        .iter()
        .filter_map(|i| i.get("name").and_then(|v| v.as_str()))
        .collect();
    assert!(names.contains(&"first"), "backlog row should replay");
    assert!(names.contains(&"second"), "live event should stream");
}

#[tokio::test]
async fn test_resource_tag_cleanup_closes_listener() {
    let graph = Graph::new();
    graph
        .new_table(
            TableSchema::new()
                .with_name("tracked")
                .with_attr("name", AttrConfig::new().indexed()),
        )
        .unwrap();

    let context = QueryExecutionContext::new().with_resource_tag("conn-1");
    let out = graph
        .query_with_context(
            QueryTuple::new().with_attr("listen").with_attr("name"),
            QueryParameters::new(),
            context,
        )
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!out.is_done());

    graph.close_resources("conn-1");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(out.is_done());
}

#[tokio::test]
async fn test_cooperative_cancellation_terminates_with_single_done() {
    let graph = Graph::new();

    let source = Stream::new();
    let source_for_mount = source.clone();
    graph
        .mount(vec![MountPointSpec::new()
            .attr("x", MountAttr::new().output())
            .required_attr("feed")
            .with_callback(native_callback(move |_task: &Task| {
                Ok(CallbackOutput::Stream(source_for_mount.clone()))
            }))])
        .unwrap();

    let out = graph
        .query(
            QueryTuple::new().with_attr("feed").with_attr("x"),
            QueryParameters::new(),
        )
        .unwrap();

    let seen: Arc<Mutex<Vec<StreamEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    out.send_to(move |event: StreamEvent| {
        let is_item = matches!(event, StreamEvent::Item { .. });
        sink.lock().push(event);
        if is_item {
            // Cooperative stop after the first item.
            return Err(Error::BackpressureStop);
        }
        Ok(())
    });

    // The stop raised by the receiver propagates back to the producer
    // synchronously; a well-behaved producer then terminates cleanly.
    let err = source.put(Item::new().with("x", 1i64)).unwrap_err();
    assert!(err.is_backpressure_stop());
    source.send_done_if_needed();

    let events = seen.lock().clone();
    assert_eq!(items_of(&events).len(), 1);
    assert!(errors_of(&events).is_empty());
    assert_eq!(events.iter().filter(|e| e.is_done()).count(), 1);
    assert!(out.is_done());
}

#[tokio::test]
async fn test_ambiguous_match_warns_and_continues() {
    init_logging();
    let graph = Graph::new();

    let warned: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = warned.clone();
    graph.set_ambiguity_hook(move |query| sink.lock().push(query.to_string()));

    let make_point = |v: i64| {
        MountPointSpec::new()
            .required_attr("thing")
            .attr("n", MountAttr::new().output())
            .with_callback(native_callback(move |_task: &Task| {
                Ok(CallbackOutput::Item(Item::new().with("n", v)))
            }))
    };
    graph.mount(vec![make_point(1), make_point(2)]).unwrap();

    let out = graph
        .query(
            QueryTuple::new().with_attr("thing").with_attr("n"),
            QueryParameters::new(),
        )
        .unwrap();
    let (items, errors) = out.collect_items().await;

    // First match wins; soft warning recorded; no hard error.
    assert!(errors.is_empty());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("n").unwrap().as_i64(), Some(1));
    assert_eq!(warned.lock().len(), 1);
}

#[tokio::test]
async fn test_unique_violation_via_put_verb() {
    let graph = Graph::new();
    let table = graph
        .new_table(
            TableSchema::new()
                .with_name("uniq")
                .with_attr("k", AttrConfig::new().unique(OnConflict::Error)),
        )
        .unwrap();
    table.put(Item::new().with("k", "a")).unwrap();

    let put_query = weir_core::Query::new(vec![QueryTuple::new().with_attr("put")]);
    let out = graph
        .transform(vec![Item::new().with("k", "a")], put_query)
        .unwrap();
    let (_, errors) = out.collect_items().await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::UniqueViolation);
    assert_eq!(table.count(), 1);
}

#[tokio::test]
async fn test_delete_verb_point() {
    let graph = Graph::new();
    let table = graph
        .new_table(
            TableSchema::new()
                .with_name("rows")
                .with_attr("k", AttrConfig::new().indexed()),
        )
        .unwrap();
    table.put(Item::new().with("k", "a")).unwrap();
    table.put(Item::new().with("k", "b")).unwrap();

    let out = graph
        .query(
            QueryTuple::new()
                .with_value("k", "a")
                .with_attr("delete!"),
            QueryParameters::new(),
        )
        .unwrap();
    let (_, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    assert_eq!(table.count(), 1);
    assert_eq!(table.scan()[0].get("k").unwrap().as_str(), Some("b"));
}

#[tokio::test]
async fn test_add_verb_merges_second_query() {
    let graph = Graph::new();
    graph
        .mount(vec![MountPointSpec::new()
            .required_attr("extras")
            .attr("n", MountAttr::new().output())
            .with_callback(native_callback(|_task: &Task| {
                Ok(CallbackOutput::Item(Item::new().with("n", 99i64)))
            }))])
        .unwrap();

    let query = weir_core::Query::new(vec![
        QueryTuple::new().with_attr("value").with_value("n", "1"),
        QueryTuple::new()
            .with_attr("add")
            .with_attr("extras")
            .with_attr("n"),
    ]);
    let out = graph.query(query, QueryParameters::new()).unwrap();
    let (items, errors) = out.collect_items().await;

    assert!(errors.is_empty());
    let mut ns: Vec<i64> = items
        .iter()
        .filter_map(|i| i.get("n").and_then(|v| v.as_i64()))
        .collect();
    ns.sort_unstable();
    assert_eq!(ns, vec![1, 99]);
}
