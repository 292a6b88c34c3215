//! The `with` verb: merge the verb's arguments into every item.

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};
use crate::value::Item;

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    let args = task.after_verb().to_item();
    task.input().transform(task.output().clone(), move |mut item: Item| {
        item.merge(&args);
        vec![item]
    });
    Ok(CallbackOutput::None)
}
