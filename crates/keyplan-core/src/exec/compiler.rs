//! Lowering plans into executable steps.

use tracing::debug;

use super::step::{
    DeleteStep, FilterStep, InsertStep, LimitStep, LookupStep, SortStep, StatementStep,
};
use crate::catalog::FieldSet;
use crate::error::{Error, Result};
use crate::plan::{QueryPlan, StepKind, UpdatePlan};

/// Turns accepted plans into statement steps, one per plan step.
pub struct StatementCompiler;

impl StatementCompiler {
    /// Compile a query plan.
    ///
    /// Each lookup fetches its index fields that the query mentions or that
    /// a later lookup is keyed on.
    pub fn compile_query(plan: &QueryPlan) -> Result<Vec<StatementStep>> {
        if !plan.is_answered() {
            return Err(Error::InvalidStatement(format!(
                "plan {} leaves the query unanswered",
                plan
            )));
        }

        let query_fields = plan.query().all_fields();
        let body = plan.body();
        let mut steps = Vec::with_capacity(body.len());
        for (position, step) in body.iter().enumerate() {
            let compiled = match &step.kind {
                StepKind::IndexLookup(lookup) => {
                    let mut wanted = query_fields.clone();
                    for later in body[position + 1..].iter().filter_map(|s| s.lookup()) {
                        wanted.extend(later.index.hash_fields().iter().copied());
                    }
                    let select: FieldSet = lookup
                        .index
                        .all_fields()
                        .intersection(&wanted)
                        .copied()
                        .collect();
                    let mut eq_fields = lookup.index.hash_fields().clone();
                    eq_fields.extend(lookup.eq_filter.iter().copied());

                    StatementStep::Lookup(LookupStep {
                        index: lookup.index.clone(),
                        select,
                        eq_fields,
                        range_field: lookup.range_filter,
                        limit: lookup.limit,
                    })
                }
                StepKind::Filter { eq, range } => StatementStep::Filter(FilterStep {
                    eq: eq.clone(),
                    range: *range,
                }),
                StepKind::Sort { fields } => StatementStep::Sort(SortStep {
                    fields: fields.clone(),
                }),
                StepKind::Limit { limit } => StatementStep::Limit(LimitStep { limit: *limit }),
                StepKind::Root | StepKind::Insert { .. } | StepKind::Delete { .. } => {
                    return Err(Error::InvalidStatement(format!(
                        "{} step inside a query plan",
                        step.kind.name()
                    )))
                }
            };
            steps.push(compiled);
        }

        debug!(plan = %plan, steps = steps.len(), "compiled query plan");
        Ok(steps)
    }

    /// Compile the index maintenance of an update plan: at most one delete
    /// followed by at most one insert.
    pub fn compile_update(plan: &UpdatePlan) -> Vec<StatementStep> {
        let mut steps = Vec::with_capacity(2);
        if plan.requires_delete() {
            steps.push(StatementStep::Delete(DeleteStep {
                index: plan.index().clone(),
            }));
        }
        for step in plan.update_steps() {
            if let StepKind::Insert { index, fields } = step {
                steps.push(StatementStep::Insert(InsertStep {
                    index: index.clone(),
                    fields: fields.clone(),
                }));
                break;
            }
        }
        steps
    }
}
