//! The `just` verb: keep only the attrs named by the verb's arguments.

use crate::error::Error;
use crate::exec::{CallbackOutput, Task};
use crate::value::Item;

pub(crate) fn run(task: &Task) -> Result<CallbackOutput, Error> {
    let args = task.args();
    task.input().transform(task.output().clone(), move |item: Item| {
        let mut out = Item::new();
        for (attr, value) in item.iter() {
            if args.has(attr) {
                out.set(attr, value.clone());
            }
        }
        vec![out]
    });
    Ok(CallbackOutput::None)
}
