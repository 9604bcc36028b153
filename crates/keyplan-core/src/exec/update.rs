//! Prepared writes and the support-query protocol.
//!
//! Before a write can locate the index entries it replaces, it may need to
//! read existing rows through support queries. With several support
//! queries whose first one yields ids of the written entity, the others run
//! once per id ("chained"); otherwise each runs once and their results are
//! combined by cross product ("independent").

use std::sync::Arc;

use itertools::Itertools;
use keyplan_proto::Value;
use rayon::prelude::*;
use tracing::{debug, instrument};

use super::compiler::StatementCompiler;
use super::prepared::PreparedQuery;
use super::step::StatementStep;
use crate::backend::codec::encode_key;
use crate::backend::{Backend, Row};
use crate::catalog::{FieldId, Index, Model};
use crate::config::ExecutionConfig;
use crate::error::{Error, Result};
use crate::plan::UpdatePlan;
use crate::statement::{Condition, Conditions, FieldSetting, Query, Write};

/// How support rows are resolved, decided when the update is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStrategy {
    /// No support queries; the write supplies everything.
    None,
    /// Run every support query once and cross the results.
    Independent,
    /// Run the first query for ids, then the rest once per id.
    Chained { id_field: FieldId },
}

/// Rows a write works on: its literal values and the existing entries
/// found by support queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRows {
    pub initial: Row,
    pub support: Vec<Row>,
}

/// A write compiled for one affected index.
#[derive(Debug, Clone)]
pub struct PreparedUpdate {
    write: Arc<Write>,
    index: Arc<Index>,
    support: Vec<PreparedQuery>,
    strategy: SupportStrategy,
    steps: Vec<StatementStep>,
    config: ExecutionConfig,
}

impl PreparedUpdate {
    /// Compile `plan` and decide its support strategy.
    pub fn new(model: &Model, plan: &UpdatePlan, config: ExecutionConfig) -> Result<Self> {
        let support = plan
            .support_plans()
            .iter()
            .map(PreparedQuery::new)
            .collect::<Result<Vec<_>>>()?;
        let strategy = choose_strategy(model, plan.write(), &support)?;
        debug!(index = plan.index().key(), ?strategy, "prepared update");

        Ok(Self {
            write: Arc::clone(plan.write()),
            index: Arc::clone(plan.index()),
            support,
            strategy,
            steps: StatementCompiler::compile_update(plan),
            config,
        })
    }

    pub fn write(&self) -> &Arc<Write> {
        &self.write
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn strategy(&self) -> SupportStrategy {
        self.strategy
    }

    pub fn support_queries(&self) -> &[PreparedQuery] {
        &self.support
    }

    pub fn steps(&self) -> &[StatementStep] {
        &self.steps
    }

    fn delete_step(&self) -> Option<&StatementStep> {
        self.steps
            .iter()
            .find(|step| matches!(step, StatementStep::Delete(_)))
    }

    fn insert_step(&self) -> Option<&StatementStep> {
        self.steps
            .iter()
            .find(|step| matches!(step, StatementStep::Insert(_)))
    }

    /// Apply the write to this index.
    #[instrument(skip_all, fields(index = self.index.key()))]
    pub fn execute(
        &self,
        backend: &dyn Backend,
        settings: &[FieldSetting],
        conditions: &Conditions,
    ) -> Result<()> {
        let rows = self.resolve(backend, settings, conditions)?;
        self.apply(backend, settings, rows)
    }

    /// Read the entries the write replaces without changing anything.
    pub fn resolve(
        &self,
        backend: &dyn Backend,
        settings: &[FieldSetting],
        conditions: &Conditions,
    ) -> Result<UpdateRows> {
        let initial = if self.insert_step().is_some() && self.delete_step().is_none() {
            setting_values(settings)?
        } else {
            literal_values(conditions)
        };
        let support = self.support_results(backend, conditions, &initial)?;
        Ok(UpdateRows { initial, support })
    }

    /// Delete the resolved entries, then insert their replacements.
    pub fn apply(
        &self,
        backend: &dyn Backend,
        settings: &[FieldSetting],
        rows: UpdateRows,
    ) -> Result<()> {
        let UpdateRows { initial, support } = rows;

        if let Some(step) = self.delete_step() {
            if !support.is_empty() {
                step.process(backend, &Conditions::new(), Some(support.clone()))?;
            }
        }

        let Some(StatementStep::Insert(insert)) = self.insert_step() else {
            return Ok(());
        };

        let mut rows = if support.is_empty() {
            vec![initial]
        } else {
            support
                .into_iter()
                .map(|mut row| {
                    row.extend(initial.iter().map(|(f, v)| (*f, v.clone())));
                    row
                })
                .collect()
        };

        let assigned = settings
            .iter()
            .filter(|setting| insert.fields.contains(&setting.field))
            .map(|setting| {
                let value = setting.value.clone().ok_or_else(|| unbound(setting.field))?;
                Ok((setting.field, value))
            })
            .collect::<Result<Vec<(FieldId, Value)>>>()?;
        for row in &mut rows {
            row.extend(assigned.iter().cloned());
        }

        if rows.is_empty() {
            return Ok(());
        }
        debug!(rows = rows.len(), "inserting index entries");
        StatementStep::Insert(insert.clone()).process(backend, &Conditions::new(), Some(rows))?;
        Ok(())
    }

    /// Rows read by the support queries, each merged with the write's literals.
    fn support_results(
        &self,
        backend: &dyn Backend,
        conditions: &Conditions,
        initial: &Row,
    ) -> Result<Vec<Row>> {
        let literals = literal_values(conditions);

        let mut rows = match self.strategy {
            SupportStrategy::None => return Ok(Vec::new()),
            SupportStrategy::Independent => {
                let results = self
                    .support
                    .iter()
                    .map(|prepared| {
                        let bound = bind_conditions(prepared.query(), conditions, initial);
                        prepared.execute(backend, &bound)
                    })
                    .collect::<Result<Vec<_>>>()?;
                cross_product(&results)
            }
            SupportStrategy::Chained { id_field } => {
                let bound = bind_conditions(self.support[0].query(), conditions, initial);
                let ids = distinct_ids(
                    self.support[0]
                        .execute(backend, &bound)?
                        .into_iter()
                        .filter_map(|mut row| row.remove(&id_field)),
                );

                let per_id = |id: &Value| self.rows_for_id(backend, conditions, id_field, id, initial);
                let groups: Vec<Vec<Row>> = if self.config.parallel_support {
                    ids.par_iter().map(per_id).collect::<Result<_>>()?
                } else {
                    ids.iter().map(per_id).collect::<Result<_>>()?
                };
                groups.into_iter().flatten().collect()
            }
        };

        for row in &mut rows {
            row.extend(literals.iter().map(|(f, v)| (*f, v.clone())));
        }
        Ok(rows)
    }

    fn rows_for_id(
        &self,
        backend: &dyn Backend,
        conditions: &Conditions,
        id_field: FieldId,
        id: &Value,
        initial: &Row,
    ) -> Result<Vec<Row>> {
        let mut condition = conditions.clone();
        condition.insert(id_field, Condition::eq(id_field, id.clone()));
        let results = self.support[1..]
            .iter()
            .map(|prepared| {
                let bound = bind_conditions(prepared.query(), &condition, initial);
                prepared.execute(backend, &bound)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rows = cross_product(&results);
        for row in &mut rows {
            row.insert(id_field, id.clone());
        }
        Ok(rows)
    }
}

fn choose_strategy(
    model: &Model,
    write: &Write,
    support: &[PreparedQuery],
) -> Result<SupportStrategy> {
    let Some(first) = support.first() else {
        return Ok(SupportStrategy::None);
    };
    let id_field = model.entity(write.entity()).id_field();
    if support.len() < 2 || !first.query().select().contains(&id_field) {
        return Ok(SupportStrategy::Independent);
    }

    for prepared in &support[1..] {
        let keyed = prepared
            .query()
            .conditions()
            .get(&id_field)
            .is_some_and(|c| !c.is_range());
        if !keyed {
            return Err(Error::InvalidStatement(format!(
                "chained support query lacks an equality condition on {}",
                model.field_name(id_field)
            )));
        }
    }
    Ok(SupportStrategy::Chained { id_field })
}

/// Merge one row from each result set, for every combination.
fn cross_product(results: &[Vec<Row>]) -> Vec<Row> {
    if results.is_empty() {
        return Vec::new();
    }
    results
        .iter()
        .map(|rows| rows.iter())
        .multi_cartesian_product()
        .map(|combination| {
            combination.into_iter().fold(Row::new(), |mut merged, row| {
                merged.extend(row.iter().map(|(f, v)| (*f, v.clone())));
                merged
            })
        })
        .collect()
}

/// Conditions for a support query: its own, with values taken from the
/// write's conditions, then from the initial row for unbound parameters.
fn bind_conditions(query: &Query, conditions: &Conditions, initial: &Row) -> Conditions {
    query
        .conditions()
        .iter()
        .map(|(field, own)| {
            let bound = match conditions.get(field) {
                Some(given) => given.clone(),
                None if own.value.is_none() => Condition {
                    value: initial.get(field).cloned(),
                    ..own.clone()
                },
                None => own.clone(),
            };
            (*field, bound)
        })
        .collect()
}

/// Literal values of the equality conditions.
fn literal_values(conditions: &Conditions) -> Row {
    conditions
        .values()
        .filter(|c| !c.is_range())
        .filter_map(|c| c.value.clone().map(|value| (c.field, value)))
        .collect()
}

fn setting_values(settings: &[FieldSetting]) -> Result<Row> {
    settings
        .iter()
        .map(|setting| {
            let value = setting.value.clone().ok_or_else(|| unbound(setting.field))?;
            Ok((setting.field, value))
        })
        .collect()
}

fn unbound(field: FieldId) -> Error {
    Error::InvalidStatement(format!("setting for {} is unbound", field))
}

/// Drop repeated ids, comparing values by their key encoding.
fn distinct_ids(ids: impl IntoIterator<Item = Value>) -> Vec<Value> {
    ids.into_iter().unique_by(|id| encode_key([id])).collect()
}
