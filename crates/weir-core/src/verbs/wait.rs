//! The `wait` verb: delay the input stream by `duration` milliseconds.

use std::time::Duration;

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    if task.schema_only() {
        // Dry runs must not suspend; the shape is the input, unchanged.
        task.input().send_to_stream(task.output().clone());
        return Ok(CallbackOutput::None);
    }

    let duration_ms = task.get_int("duration")?.max(0) as u64;
    let input = task.input().clone();
    let output = task.output().clone();

    Ok(CallbackOutput::future(async move {
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        input.send_to_stream(output);
        Ok(CallbackOutput::None)
    }))
}
