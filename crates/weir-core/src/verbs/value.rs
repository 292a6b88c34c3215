//! The `value` verb: emit the verb's arguments as a single item.

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    task.put(task.args())?;
    task.done();
    Ok(CallbackOutput::None)
}
