//! The `add` verb: merge a second query's results into the stream.

use crate::error::{Error, ErrorItem};
use crate::exec::{CallbackOutput, Task};
use crate::plan::runtime_plan_and_execute;
use crate::stream::join_streams;

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    let receivers = join_streams(2, task.output().clone());

    task.input().send_to_stream(receivers[0].clone());

    let search = task.after_verb().clone();
    let search_output = receivers[1].clone();
    if let Err(err) = runtime_plan_and_execute(task, search, search_output.clone()) {
        let _ = search_output.put_error(ErrorItem::from_error(&err, None));
        search_output.send_done_if_needed();
    }
    Ok(CallbackOutput::None)
}
