//! Output filters: stream-to-stream wrappers applied after a callback.

use crate::query::QueryParameters;
use crate::stream::{Stream, StreamEvent};
use crate::value::{Item, Value};

/// Where an output attribute's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputAttr {
    /// Must come from the callback's result item.
    FromItem { attr: String },
    /// Resolved from runtime parameters, not from the callback.
    FromParam { attr: String, param: String },
    /// The query supplied a literal; written into the final item
    /// unconditionally.
    Constant { attr: String, value: Value },
}

impl OutputAttr {
    pub fn attr(&self) -> &str {
        match self {
            OutputAttr::FromItem { attr }
            | OutputAttr::FromParam { attr, .. }
            | OutputAttr::Constant { attr, .. } => attr,
        }
    }
}

/// One filter in a plan's output pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFilter {
    /// Rebuild each item into the query's requested shape.
    Reshape { shape: Vec<OutputAttr> },
    /// Drop items whose attr values disagree with the query's demands
    /// (overprovision protection).
    WhereAttrsEqual { attrs: Vec<OutputAttr> },
}

/// Wrap `output` with a filter, returning the stream the task writes to.
pub(crate) fn apply_filter(
    filter: &OutputFilter,
    parameters: &QueryParameters,
    overprovision_active: bool,
    output: Stream,
) -> Stream {
    match filter {
        OutputFilter::Reshape { shape } => {
            reshaping_filter(shape.clone(), parameters.clone(), overprovision_active, output)
        }
        OutputFilter::WhereAttrsEqual { attrs } => {
            where_attrs_equal_filter(attrs.clone(), parameters.clone(), output)
        }
    }
}

/// Rebuild each item into the requested shape, in tag order.
///
/// An item is dropped entirely when none of its output attrs were actually
/// sourced from the item, unless overprovision filtering is active, in
/// which case every item counts as used.
fn reshaping_filter(
    shape: Vec<OutputAttr>,
    parameters: QueryParameters,
    overprovision_active: bool,
    output: Stream,
) -> Stream {
    Stream::to_receiver(move |event: StreamEvent| match event {
        StreamEvent::Item { item } => {
            let mut fixed = Item::new();
            let mut used_any_from_item = false;

            for output_attr in &shape {
                match output_attr {
                    OutputAttr::FromItem { attr } => {
                        if let Some(value) = item.get(attr) {
                            fixed.set(attr.clone(), value.clone());
                            used_any_from_item = true;
                        } else {
                            fixed.set(attr.clone(), Value::Null);
                        }
                    }
                    OutputAttr::FromParam { attr, param } => {
                        let value = parameters.get(param).cloned().unwrap_or(Value::Null);
                        fixed.set(attr.clone(), value);
                    }
                    OutputAttr::Constant { attr, value } => {
                        fixed.set(attr.clone(), value.clone());
                    }
                }
            }

            if overprovision_active {
                used_any_from_item = true;
            }

            if used_any_from_item {
                output.put(fixed)
            } else {
                Ok(())
            }
        }
        other => output.receive(other),
    })
}

/// Drop items whose resolved value for a demanded attr disagrees with the
/// query. Comparison uses canonical string equality.
fn where_attrs_equal_filter(
    attrs: Vec<OutputAttr>,
    parameters: QueryParameters,
    output: Stream,
) -> Stream {
    Stream::to_receiver(move |event: StreamEvent| match event {
        StreamEvent::Item { item } => {
            for attr_filter in &attrs {
                let demanded = match attr_filter {
                    OutputAttr::Constant { value, .. } => value.clone(),
                    OutputAttr::FromParam { param, .. } => {
                        parameters.get(param).cloned().unwrap_or(Value::Null)
                    }
                    OutputAttr::FromItem { .. } => continue,
                };

                let actual = item
                    .get(attr_filter.attr())
                    .cloned()
                    .unwrap_or(Value::Null);

                if demanded.canonical_string() != actual.canonical_string() {
                    return Ok(());
                }
            }
            output.put(item)
        }
        other => output.receive(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> Vec<OutputAttr> {
        vec![
            OutputAttr::Constant {
                attr: "a".to_string(),
                value: Value::String("5".to_string()),
            },
            OutputAttr::FromItem {
                attr: "b".to_string(),
            },
            OutputAttr::FromParam {
                attr: "c".to_string(),
                param: "c".to_string(),
            },
        ]
    }

    #[test]
    fn test_reshape_orders_and_sources_attrs() {
        let output = Stream::new();
        let params = QueryParameters::new().with("c", Value::Int(3));
        let input = reshaping_filter(shape(), params, false, output.clone());

        input
            .put(Item::new().with("b", 9i64).with("extra", 1i64))
            .unwrap();
        input.done().unwrap();

        let (items, _) = output.take_items_and_errors();
        assert_eq!(items.len(), 1);
        let attrs: Vec<&str> = items[0].attrs().collect();
        assert_eq!(attrs, vec!["a", "b", "c"]);
        assert_eq!(items[0].get("a").unwrap().as_str(), Some("5"));
        assert_eq!(items[0].get("b").unwrap().as_i64(), Some(9));
        assert_eq!(items[0].get("c").unwrap().as_i64(), Some(3));
        assert!(!items[0].has("extra"));
    }

    #[test]
    fn test_reshape_drops_all_synthetic_items() {
        let output = Stream::new();
        let input = reshaping_filter(shape(), QueryParameters::new(), false, output.clone());

        // Nothing sourced from the item itself: dropped.
        input.put(Item::new().with("other", 1i64)).unwrap();
        input.done().unwrap();

        let (items, _) = output.take_items_and_errors();
        assert!(items.is_empty());
    }

    #[test]
    fn test_reshape_keeps_items_when_overprovision_active() {
        let output = Stream::new();
        let input = reshaping_filter(shape(), QueryParameters::new(), true, output.clone());

        input.put(Item::new().with("other", 1i64)).unwrap();
        input.done().unwrap();

        let (items, _) = output.take_items_and_errors();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_where_attrs_equal_drops_mismatches() {
        let output = Stream::new();
        let attrs = vec![OutputAttr::Constant {
            attr: "a".to_string(),
            value: Value::String("6".to_string()),
        }];
        let input = where_attrs_equal_filter(attrs, QueryParameters::new(), output.clone());

        input.put(Item::new().with("a", 5i64)).unwrap();
        input.put(Item::new().with("a", 6i64)).unwrap();
        input.done().unwrap();

        let (items, _) = output.take_items_and_errors();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("a").unwrap().as_i64(), Some(6));
    }

    #[test]
    fn test_filters_forward_non_item_events() {
        let output = Stream::new();
        let input = reshaping_filter(shape(), QueryParameters::new(), false, output.clone());

        input.put_schema(Item::new().with("a", Value::Null)).unwrap();
        input.done().unwrap();

        let events = output.take_events();
        assert!(matches!(events[0], StreamEvent::Schema { .. }));
        assert!(events[1].is_done());
    }
}
