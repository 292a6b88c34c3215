//! The `run_query_with_provider` verb: delegate a nested query to a registered
//! provider.

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};
use crate::graph::run_query_with_provider;
use crate::query::Query;
use crate::value::Value;

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    if task.schema_only() {
        task.done();
        return Ok(CallbackOutput::None);
    }

    let provider_id = task.get_string("provider_id")?;
    let query = match task.get("query")? {
        Value::Query(q) => q,
        Value::Tuple(t) => Query::from(t),
        _ => return Err(Error::InvalidData("missing 'query'".to_string())),
    };

    let result = run_query_with_provider(task.graph(), &provider_id, query, task.input().clone());
    result.send_to_stream(task.output().clone());
    Ok(CallbackOutput::None)
}
