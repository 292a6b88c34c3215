//! The `put` verb: for each input item, run a nested `put!` step against the
//! matching table mount.

use crate::error::{Error, ErrorItem};
use crate::exec::{CallbackOutput, Task};
use crate::plan::runtime_plan_and_execute;
use crate::query::{QueryTag, QueryTuple};
use crate::stream::{Stream, StreamingTransformOptions};
use crate::value::{Item, TaggedValue};

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    if task.schema_only() {
        task.done();
        return Ok(CallbackOutput::None);
    }

    let verb_params = task.after_verb().clone();
    let nested_task = task.clone();

    task.input().streaming_transform(
        task.output().clone(),
        move |lhs_item: Item| {
            let mut put_tuple = QueryTuple::new().with_tag(
                QueryTag::new("put!").with_value(TaggedValue::Tuple(QueryTuple::new())),
            );

            for (attr, value) in lhs_item.iter() {
                put_tuple.add_tag(QueryTag {
                    attr: attr.to_string(),
                    value: TaggedValue::from_value(value),
                    identifier: None,
                    is_optional: false,
                });
            }
            for tag in verb_params.tags() {
                put_tuple.add_or_overwrite_tag(tag.clone());
            }

            let output = Stream::new();
            if let Err(err) = runtime_plan_and_execute(&nested_task, put_tuple, output.clone()) {
                let _ = output.put_error(ErrorItem::from_error(&err, None));
                let _ = output.done();
            }
            output
        },
        StreamingTransformOptions::default(),
    );
    Ok(CallbackOutput::None)
}
