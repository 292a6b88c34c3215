//! The `reverse` verb: emit all items in reverse order.

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    task.input().aggregate(task.output().clone(), |mut items| {
        items.reverse();
        items
    });
    Ok(CallbackOutput::None)
}
