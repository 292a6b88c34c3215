//! Multi-step plans: compile a pipeline, thread expected shapes, chain
//! streams.

use crate::error::Error;
use crate::graph::{Graph, QueryExecutionContext};
use crate::plan::{ExpectedValue, Plan};
use crate::query::{Query, QueryParameters};
use crate::stream::Stream;

/// A compiled pipeline: one [`Plan`] per step, with each step's expected
/// input taken from the previous step's expected output.
#[derive(Clone)]
pub struct MultiStepPlan {
    steps: Vec<Plan>,
    query_string: String,
}

impl MultiStepPlan {
    /// Compile every step of a query, left to right.
    pub fn compile(
        graph: &Graph,
        context: &QueryExecutionContext,
        query: &Query,
    ) -> Result<MultiStepPlan, Error> {
        let mut expected_input = if query.is_transform() {
            ExpectedValue::SomeValue
        } else {
            ExpectedValue::NoValue
        };

        let mut steps = Vec::with_capacity(query.steps().len());
        for tuple in query.steps() {
            let plan = Plan::compile(graph, context, tuple.clone(), expected_input)?;
            expected_input = plan.expected_output().clone();
            steps.push(plan);
        }

        Ok(MultiStepPlan {
            steps,
            query_string: query.to_query_string(),
        })
    }

    pub fn steps(&self) -> &[Plan] {
        &self.steps
    }

    /// The canonical query string this plan was compiled from; used as the
    /// plan-cache key.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// The last step's expected output shape.
    pub fn expected_output(&self) -> ExpectedValue {
        self.steps
            .last()
            .map(|p| p.expected_output().clone())
            .unwrap_or(ExpectedValue::NoValue)
    }

    /// Execute the pipeline: step outputs feed the next step's input; the
    /// last step writes to `output`. An empty pipeline forwards its input.
    pub fn execute(&self, parameters: QueryParameters, input: Stream, output: Stream) {
        if self.steps.is_empty() {
            input.send_to_stream(output);
            return;
        }

        let mut current_input = input;
        let last = self.steps.len() - 1;
        for (i, step) in self.steps.iter().enumerate() {
            let step_output = if i == last {
                output.clone()
            } else {
                Stream::with_label(format!("pipe:{}", i))
            };
            step.execute(parameters.clone(), current_input, step_output.clone());
            current_input = step_output;
        }
    }
}

impl std::fmt::Debug for MultiStepPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStepPlan")
            .field("query", &self.query_string)
            .field("steps", &self.steps.len())
            .finish()
    }
}
