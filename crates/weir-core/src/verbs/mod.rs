//! Built-in verbs.
//!
//! `get` and `join` are completed by the planner itself; everything here
//! is an "alt verb" that runs as a native callback. Alt verbs execute with
//! the streaming declaration preset, so each one owns its output's
//! termination (usually by forwarding the input's `done`).

mod add;
mod incoming;
mod just;
mod listen;
mod put;
mod rename;
mod reverse;
mod run_query_with_provider;
mod then;
mod update;
mod value;
mod wait;
mod with;

use std::sync::Arc;

use crate::error::Error;
use crate::exec::{CallbackOutput, NativeCallback, Task};

type VerbFn = fn(&Task) -> Result<CallbackOutput, Error>;

/// Look up a built-in alt verb by name.
pub(crate) fn find_builtin(name: &str) -> Option<NativeCallback> {
    let run: VerbFn = match name {
        "add" => add::run,
        "incoming" => incoming::run,
        "just" => just::run,
        "listen" => listen::run,
        "put" => put::run,
        "rename" => rename::run,
        "reverse" => reverse::run,
        "run_query_with_provider" => run_query_with_provider::run,
        "then" => then::run,
        "update" => update::run,
        "value" => value::run,
        "wait" => wait::run,
        "with" => with::run,
        _ => return None,
    };
    Some(Arc::new(run))
}

/// Whether a name is reserved by any built-in verb (planner verbs
/// included).
pub fn is_builtin(name: &str) -> bool {
    matches!(name, "get" | "join") || find_builtin(name).is_some()
}
