//! A full pipe-chained query.

use crate::query::{QueryParameters, QueryTuple};

/// An ordered sequence of [`QueryTuple`] steps, piped left to right.
///
/// `is_transform` marks whether step 0 expects a pre-existing input stream
/// (a "transform") or none (a "query").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    steps: Vec<QueryTuple>,
    is_transform: bool,
}

impl Query {
    /// Create a query from steps.
    pub fn new(steps: Vec<QueryTuple>) -> Self {
        Self {
            steps,
            is_transform: false,
        }
    }

    /// Mark the query as a transform (step 0 consumes an input stream).
    pub fn transform(mut self) -> Self {
        self.is_transform = true;
        self
    }

    /// Whether step 0 expects a pre-existing input stream.
    pub fn is_transform(&self) -> bool {
        self.is_transform
    }

    /// The steps in order.
    pub fn steps(&self) -> &[QueryTuple] {
        &self.steps
    }

    /// The first step.
    pub fn first(&self) -> Option<&QueryTuple> {
        self.steps.first()
    }

    /// Replace identifier-bound tags in every step with parameter values.
    pub fn inject_parameters(&self, params: &QueryParameters) -> Query {
        self.remap_tuples(|tuple| Some(tuple.inject_parameters(params)))
    }

    /// Map over the steps, dropping steps for which `f` returns None.
    pub fn remap_tuples<F>(&self, mut f: F) -> Query
    where
        F: FnMut(&QueryTuple) -> Option<QueryTuple>,
    {
        Query {
            steps: self.steps.iter().filter_map(|s| f(s)).collect(),
            is_transform: self.is_transform,
        }
    }

    /// Rewrite the last step.
    pub fn modify_last_step<F>(&self, f: F) -> Query
    where
        F: FnOnce(&QueryTuple) -> QueryTuple,
    {
        let mut steps = self.steps.clone();
        if let Some(last) = steps.pop() {
            steps.push(f(&last));
        }
        Query {
            steps,
            is_transform: self.is_transform,
        }
    }

    /// Canonical string form: steps joined by ` | `, with a leading `| `
    /// for transforms.
    pub fn to_query_string(&self) -> String {
        let prefix = if self.is_transform { "| " } else { "" };
        let steps: Vec<String> = self.steps.iter().map(|s| s.to_query_string()).collect();
        format!("{}{}", prefix, steps.join(" | "))
    }
}

impl From<QueryTuple> for Query {
    fn from(tuple: QueryTuple) -> Self {
        Query::new(vec![tuple])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string() {
        let q = Query::new(vec![
            QueryTuple::new().with_attr("get").with_attr("user"),
            QueryTuple::new().with_attr("just").with_attr("name"),
        ]);
        assert_eq!(q.to_query_string(), "get user | just name");
        assert_eq!(q.clone().transform().to_query_string(), "| get user | just name");
    }

    #[test]
    fn test_modify_last_step() {
        let q = Query::new(vec![QueryTuple::new().with_attr("get")]);
        let q2 = q.modify_last_step(|t| t.clone().with_attr("extra"));
        assert_eq!(q2.to_query_string(), "get extra");
    }

    #[test]
    fn test_from_tuple() {
        let q: Query = QueryTuple::new().with_attr("value").with_value("a", "1").into();
        assert_eq!(q.steps().len(), 1);
        assert!(!q.is_transform());
    }
}
