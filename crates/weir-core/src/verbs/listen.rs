//! The `listen` verb: resolve the related listener-stream mount and pipe its live
//! feed into the output.

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    if task.schema_only() {
        task.done();
        return Ok(CallbackOutput::None);
    }

    let result = task.query_related(&["listener-stream"], task.parameters().clone())?;
    let output = task.output().clone();

    Ok(CallbackOutput::future(async move {
        let first = result.one_item().await?;
        let listener = first
            .get("listener-stream")
            .and_then(|v| v.as_stream())
            .cloned()
            .ok_or_else(|| {
                Error::InvalidData("query result carried no listener-stream".to_string())
            })?;

        listener.send_to_stream(output);
        Ok(CallbackOutput::None)
    }))
}
