//! Prepared queries.

use std::sync::Arc;

use tracing::{instrument, trace};

use super::compiler::StatementCompiler;
use super::step::StatementStep;
use crate::backend::{project, Backend, Row};
use crate::error::Result;
use crate::plan::QueryPlan;
use crate::statement::{Conditions, Query};

/// A query compiled against its plan, ready to run with any input values.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    query: Arc<Query>,
    steps: Vec<StatementStep>,
}

impl PreparedQuery {
    /// Compile `plan`.
    pub fn new(plan: &QueryPlan) -> Result<Self> {
        Ok(Self {
            query: Arc::clone(plan.query()),
            steps: StatementCompiler::compile_query(plan)?,
        })
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn steps(&self) -> &[StatementStep] {
        &self.steps
    }

    /// Run the pipeline and return rows holding exactly the selected fields.
    ///
    /// Lookups only see the input conditions on their own index. The
    /// pipeline stops as soon as a step yields no rows.
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub fn execute(&self, backend: &dyn Backend, conditions: &Conditions) -> Result<Vec<Row>> {
        let mut rows: Option<Vec<Row>> = None;

        for step in &self.steps {
            let output = match step {
                StatementStep::Lookup(lookup) => {
                    let fields = lookup.index.all_fields();
                    let active: Conditions = conditions
                        .iter()
                        .filter(|(field, _)| fields.contains(field))
                        .map(|(field, condition)| (*field, condition.clone()))
                        .collect();
                    step.process(backend, &active, rows.take())?
                }
                _ => step.process(backend, conditions, rows.take())?,
            };

            if output.is_empty() {
                trace!("pipeline short-circuited on empty rows");
                return Ok(Vec::new());
            }
            rows = Some(output);
        }

        let select = self.query.select();
        Ok(rows
            .unwrap_or_default()
            .iter()
            .map(|row| project(row, select))
            .collect())
    }
}
