//! The `rename` verb: rename attr `from` to `to` on each item.

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};
use crate::value::Item;

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    let from = task.get_string("from")?;
    let to = task.get_string("to")?;

    task.input().transform(task.output().clone(), move |mut item: Item| {
        if let Some(value) = item.remove(&from) {
            item.set(to.clone(), value);
        }
        vec![item]
    });
    Ok(CallbackOutput::None)
}
