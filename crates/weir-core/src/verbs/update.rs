//! The `update` verb: for each input item, run a nested `update!` step carrying
//! the verb's arguments as the update body.

use crate::error::{Error, ErrorItem};
use crate::exec::{CallbackOutput, Task};
use crate::plan::runtime_plan_and_execute;
use crate::query::{QueryTag, QueryTuple};
use crate::stream::{Stream, StreamingTransformOptions};
use crate::value::{Item, TaggedValue};

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    let verb_params = task.after_verb().clone();
    let nested_task = task.clone();

    task.input().streaming_transform(
        task.output().clone(),
        move |lhs_item: Item| {
            let mut body = QueryTuple::new();
            for tag in verb_params.tags() {
                body.add_tag(QueryTag {
                    attr: tag.attr.clone(),
                    value: tag.value.clone(),
                    identifier: None,
                    is_optional: false,
                });
            }

            let mut update_tuple = QueryTuple::new()
                .with_tag(QueryTag::new("update!").with_value(TaggedValue::Tuple(body)));
            for (attr, value) in lhs_item.iter() {
                update_tuple.add_tag(QueryTag {
                    attr: attr.to_string(),
                    value: TaggedValue::from_value(value),
                    identifier: None,
                    is_optional: false,
                });
            }

            let output = Stream::new();
            if let Err(err) = runtime_plan_and_execute(&nested_task, update_tuple, output.clone())
            {
                let _ = output.put_error(ErrorItem::from_error(&err, None));
                let _ = output.done();
            }
            output
        },
        StreamingTransformOptions::default(),
    );
    Ok(CallbackOutput::None)
}
