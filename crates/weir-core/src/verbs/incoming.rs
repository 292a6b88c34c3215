//! The `incoming` verb: forward the input stream unchanged.

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    if task.schema_only() {
        task.put(task.args())?;
        task.done();
        return Ok(CallbackOutput::None);
    }

    task.input().send_to_stream(task.output().clone());
    Ok(CallbackOutput::None)
}
