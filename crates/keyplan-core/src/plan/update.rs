//! Planning writes against denormalized indexes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::search::Planner;
use super::step::{QueryPlan, StepKind};
use crate::catalog::{FieldSet, Index, KeyPath};
use crate::error::{Error, Result};
use crate::statement::{Query, Write, WriteKind};

/// Support queries supplied by the caller, keyed by index key.
pub type SupportQueries = HashMap<String, Vec<Arc<Query>>>;

/// How one write maintains one index.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    write: Arc<Write>,
    index: Arc<Index>,
    support: Vec<QueryPlan>,
    update_steps: Vec<StepKind>,
}

impl UpdatePlan {
    pub fn write(&self) -> &Arc<Write> {
        &self.write
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// Plans of the queries that read existing rows before the write.
    pub fn support_plans(&self) -> &[QueryPlan] {
        &self.support
    }

    /// Delete and insert actions, in execution order.
    pub fn update_steps(&self) -> &[StepKind] {
        &self.update_steps
    }

    pub fn requires_delete(&self) -> bool {
        self.update_steps
            .iter()
            .any(|step| matches!(step, StepKind::Delete { .. }))
    }

    pub fn requires_insert(&self) -> bool {
        self.update_steps
            .iter()
            .any(|step| matches!(step, StepKind::Insert { .. }))
    }
}

/// Finds the indexes a write touches and plans how to maintain each.
pub struct UpdatePlanner<'p, 'm> {
    planner: &'p Planner<'m>,
}

impl<'p, 'm> UpdatePlanner<'p, 'm> {
    /// Plan support queries with `planner` over its indexes.
    pub fn new(planner: &'p Planner<'m>) -> Self {
        Self { planner }
    }

    /// Indexes whose contents change under `write`.
    pub fn affected_indexes(&self, write: &Write) -> Vec<Arc<Index>> {
        let settings = write.setting_fields();
        self.planner
            .indexes()
            .iter()
            .filter(|index| match write.kind() {
                WriteKind::Insert | WriteKind::Delete => index.key_path().contains(write.entity()),
                WriteKind::Update => !index.all_fields().is_disjoint(&settings),
            })
            .cloned()
            .collect()
    }

    /// Plan every affected index, deriving support queries.
    pub fn find_plans(&self, write: &Arc<Write>) -> Result<Vec<UpdatePlan>> {
        self.find_plans_with_support(write, &SupportQueries::new())
    }

    /// Plan every affected index, using explicit support queries where given.
    pub fn find_plans_with_support(
        &self,
        write: &Arc<Write>,
        support: &SupportQueries,
    ) -> Result<Vec<UpdatePlan>> {
        let plans = self
            .affected_indexes(write)
            .into_iter()
            .map(|index| {
                let queries = match support.get(index.key()) {
                    Some(queries) => queries.clone(),
                    None => self.derive_support(write, &index)?,
                };
                self.plan_index(write, index, &queries)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(indexes = plans.len(), kind = ?write.kind(), "planned write");
        Ok(plans)
    }

    /// Plan maintenance of one index with the given support queries.
    pub fn plan_index(
        &self,
        write: &Arc<Write>,
        index: Arc<Index>,
        support: &[Arc<Query>],
    ) -> Result<UpdatePlan> {
        let support = support
            .iter()
            .map(|query| self.planner.min_plan(query))
            .collect::<Result<Vec<_>>>()?;

        let mut update_steps = Vec::with_capacity(2);
        if write.requires_delete() {
            update_steps.push(StepKind::Delete {
                index: Arc::clone(&index),
            });
        }
        if write.requires_insert() {
            update_steps.push(StepKind::Insert {
                index: Arc::clone(&index),
                fields: write.setting_fields(),
            });
        }

        Ok(UpdatePlan {
            write: Arc::clone(write),
            index,
            support,
            update_steps,
        })
    }

    /// Support queries for a single-entity index on the written entity.
    ///
    /// Reads the index fields the write does not supply, under the write's
    /// conditions. Inserts supply every value themselves.
    fn derive_support(&self, write: &Write, index: &Index) -> Result<Vec<Arc<Query>>> {
        let model = self.planner.model();
        if index.path().len() != 1 || index.path()[0] != write.entity() {
            return Err(Error::InvalidStatement(format!(
                "index {} spans several entities; {:?} on '{}' needs explicit support queries",
                index.key(),
                write.kind(),
                model.entity(write.entity()).name
            )));
        }
        if write.kind() == WriteKind::Insert {
            return Ok(Vec::new());
        }

        let eq = write.eq_fields();
        let mut select: FieldSet = index.all_fields().difference(&eq).copied().collect();
        if select.is_empty() {
            select = index.all_fields().clone();
        }
        let query = Query::new(
            model,
            KeyPath::entity(model, write.entity()),
            select,
            write.conditions().clone(),
            Vec::new(),
            None,
        )?;
        Ok(vec![Arc::new(query)])
    }
}
