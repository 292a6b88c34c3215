//! The planner: per-step compilation and multi-step chaining.

mod filters;
mod join;
mod multi;
#[allow(clippy::module_inception)]
mod plan;

pub use filters::{OutputAttr, OutputFilter};
pub use multi::MultiStepPlan;
pub use plan::{ExpectedValue, Plan};

pub(crate) use plan::runtime_plan_and_execute;
