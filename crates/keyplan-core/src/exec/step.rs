//! Executable statement steps.

use std::sync::Arc;

use tracing::trace;

use crate::backend::{Backend, Row};
use crate::catalog::{FieldId, FieldSet, Index};
use crate::error::{Error, Result};
use crate::statement::{Condition, Conditions};

/// Backend-bound counterpart of a plan step.
///
/// Steps hold only parameters fixed at compile time and can run any number
/// of times with different input conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementStep {
    Lookup(LookupStep),
    Filter(FilterStep),
    Sort(SortStep),
    Limit(LimitStep),
    Insert(InsertStep),
    Delete(DeleteStep),
}

impl StatementStep {
    /// Run the step over the rolling rows; `None` before the first step.
    pub fn process(
        &self,
        backend: &dyn Backend,
        conditions: &Conditions,
        rows: Option<Vec<Row>>,
    ) -> Result<Vec<Row>> {
        match self {
            StatementStep::Lookup(step) => step.process(backend, conditions, rows),
            StatementStep::Filter(step) => step.process(backend, conditions, rows.unwrap_or_default()),
            StatementStep::Sort(step) => Ok(backend.sort(rows.unwrap_or_default(), &step.fields)),
            StatementStep::Limit(step) => Ok(backend.limit(rows.unwrap_or_default(), step.limit)),
            StatementStep::Insert(step) => {
                let rows = rows.unwrap_or_default();
                backend.insert(&step.index, &rows)?;
                Ok(rows)
            }
            StatementStep::Delete(step) => {
                let rows = rows.unwrap_or_default();
                backend.delete(&step.index, &rows)?;
                Ok(rows)
            }
        }
    }

    /// The index a lookup, insert or delete touches.
    pub fn index(&self) -> Option<&Arc<Index>> {
        match self {
            StatementStep::Lookup(step) => Some(&step.index),
            StatementStep::Insert(step) => Some(&step.index),
            StatementStep::Delete(step) => Some(&step.index),
            _ => None,
        }
    }
}

/// Fetch rows from an index, keyed by values from earlier rows or the input.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupStep {
    pub index: Arc<Index>,
    /// Fields requested from the backend.
    pub select: FieldSet,
    /// Fields bound by equality: hash fields plus the equality filter.
    pub eq_fields: FieldSet,
    pub range_field: Option<FieldId>,
    /// Local limit applied to the output.
    pub limit: Option<usize>,
}

impl LookupStep {
    fn process(
        &self,
        backend: &dyn Backend,
        conditions: &Conditions,
        rows: Option<Vec<Row>>,
    ) -> Result<Vec<Row>> {
        let first = rows.is_none();
        let seeds = match rows {
            Some(rows) => rows,
            None => vec![Self::initial_row(conditions)?],
        };

        let groups = seeds
            .iter()
            .map(|row| self.result_conditions(conditions, row))
            .collect::<Result<Vec<_>>>()?;
        let fetched = backend.fetch_batch(&self.index, &self.select, &groups)?;

        let mut results = Vec::new();
        for (seed, rows) in seeds.into_iter().zip(fetched) {
            if first {
                results.extend(rows);
                continue;
            }
            for row in rows {
                let mut merged = seed.clone();
                merged.extend(row);
                results.push(merged);
            }
        }
        trace!(index = self.index.key(), seeds = groups.len(), rows = results.len(), "lookup");

        Ok(match self.limit {
            Some(limit) => backend.limit(results, limit),
            None => results,
        })
    }

    /// Literal values of the input conditions as one row.
    fn initial_row(conditions: &Conditions) -> Result<Row> {
        conditions
            .values()
            .map(|condition| {
                let value = condition.value.clone().ok_or_else(|| {
                    Error::InvalidStatement(format!("condition on {} is unbound", condition.field))
                })?;
                Ok((condition.field, value))
            })
            .collect()
    }

    /// Backend conditions for one seed row.
    fn result_conditions(&self, conditions: &Conditions, row: &Row) -> Result<Vec<Condition>> {
        let mut result = Vec::with_capacity(self.eq_fields.len() + 1);
        for field in &self.eq_fields {
            let value = row
                .get(field)
                .cloned()
                .or_else(|| {
                    conditions
                        .get(field)
                        .filter(|c| !c.is_range())
                        .and_then(|c| c.value.clone())
                })
                .ok_or_else(|| {
                    Error::InvalidStatement(format!(
                        "no value for lookup field {} on index {}",
                        field,
                        self.index.key()
                    ))
                })?;
            result.push(Condition::eq(*field, value));
        }

        if let Some(field) = self.range_field {
            let range = conditions
                .get(&field)
                .filter(|c| c.is_range() && c.value.is_some())
                .ok_or_else(|| {
                    Error::InvalidStatement(format!("no range value for {}", field))
                })?;
            result.push(range.clone());
        }
        Ok(result)
    }
}

/// Keep rows matching the residual equality and range conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStep {
    pub eq: FieldSet,
    pub range: Option<FieldId>,
}

impl FilterStep {
    fn process(&self, backend: &dyn Backend, conditions: &Conditions, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut active = Vec::with_capacity(self.eq.len() + 1);
        for field in self.eq.iter().chain(self.range.iter()) {
            let condition = conditions
                .get(field)
                .filter(|c| c.value.is_some())
                .ok_or_else(|| {
                    Error::InvalidStatement(format!("no filter value for {}", field))
                })?;
            active.push(condition.clone());
        }
        Ok(backend.filter(rows, &active))
    }
}

/// Stable ascending sort.
#[derive(Debug, Clone, PartialEq)]
pub struct SortStep {
    pub fields: Vec<FieldId>,
}

/// Truncate to a fixed count.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitStep {
    pub limit: usize,
}

/// Write rows into an index.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStep {
    pub index: Arc<Index>,
    /// Fields the write assigns.
    pub fields: FieldSet,
}

/// Remove index entries identified by rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStep {
    pub index: Arc<Index>,
}
