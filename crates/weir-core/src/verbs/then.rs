//! The `then` verb: forward the input; when it finishes, run the remaining tuple
//! as a fresh query into the same output.

use crate::error::{Error, ErrorItem};
use crate::exec::{CallbackOutput, Task};
use crate::plan::runtime_plan_and_execute;
use crate::stream::{join_streams, StreamEvent};

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    if task.schema_only() {
        task.done();
        return Ok(CallbackOutput::None);
    }

    let receivers = join_streams(2, task.output().clone());
    let forward = receivers[0].clone();
    let search_output = receivers[1].clone();

    let nested_task = task.clone();
    let remaining = task.after_verb().clone();
    let mut launched = false;

    task.input().send_to(move |event: StreamEvent| {
        let is_done = event.is_done();
        forward.receive(event)?;

        if is_done && !launched {
            launched = true;
            if let Err(err) =
                runtime_plan_and_execute(&nested_task, remaining.clone(), search_output.clone())
            {
                let _ = search_output.put_error(ErrorItem::from_error(&err, None));
                search_output.send_done_if_needed();
            }
        }
        Ok(())
    });
    Ok(CallbackOutput::None)
}
