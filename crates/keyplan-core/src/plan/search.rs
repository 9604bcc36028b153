//! Reference plan search over a fixed set of indexes.
//!
//! Enumerates chains of admitted lookups and residual steps depth-first.
//! This is not the index-selection search; the candidate indexes are given.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::cost::CostModel;
use super::lookup::IndexLookup;
use super::residual::{apply_filter, apply_limit, apply_sort};
use super::step::{PlanStep, QueryPlan, StepId};
use crate::catalog::{Index, Model};
use crate::config::PlannerConfig;
use crate::error::{Error, Result};
use crate::statement::Query;

/// Depth-first planner over candidate indexes.
pub struct Planner<'a> {
    model: &'a Model,
    indexes: Vec<Arc<Index>>,
    config: PlannerConfig,
    cost: CostModel,
}

impl<'a> Planner<'a> {
    /// Create a planner with the default configuration.
    pub fn new(model: &'a Model, indexes: impl IntoIterator<Item = Arc<Index>>) -> Self {
        Self::with_config(model, indexes, PlannerConfig::default())
    }

    /// Create a planner with an explicit configuration.
    pub fn with_config(
        model: &'a Model,
        indexes: impl IntoIterator<Item = Arc<Index>>,
        config: PlannerConfig,
    ) -> Self {
        let cost = CostModel::from_config(&config);
        Self {
            model,
            indexes: indexes.into_iter().collect(),
            config,
            cost,
        }
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }

    pub fn indexes(&self) -> &[Arc<Index>] {
        &self.indexes
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Every plan answering `query`.
    #[instrument(skip(self, query), fields(indexes = self.indexes.len()))]
    pub fn find_plans(&self, query: &Arc<Query>) -> Result<Vec<QueryPlan>> {
        let mut chain = vec![PlanStep::root(Arc::clone(query))];
        let mut used = vec![false; self.indexes.len()];
        let mut plans = Vec::new();
        self.extend(query, &mut chain, &mut used, &mut plans);

        if plans.is_empty() {
            return Err(Error::NoPlanFound(self.describe_query(query)));
        }
        debug!(plans = plans.len(), "enumerated query plans");
        Ok(plans)
    }

    /// The cheapest plan answering `query`.
    pub fn min_plan(&self, query: &Arc<Query>) -> Result<QueryPlan> {
        let plans = self.find_plans(query)?;
        let mut best: Option<(f64, QueryPlan)> = None;
        for plan in plans {
            let cost = self.cost.plan_cost(&plan).total_cost;
            if best.as_ref().map_or(true, |(best_cost, _)| cost < *best_cost) {
                best = Some((cost, plan));
            }
        }
        let (cost, plan) = best.ok_or_else(|| Error::NoPlanFound(self.describe_query(query)))?;
        debug!(cost, plan = %plan, "selected query plan");
        Ok(plan)
    }

    fn extend(
        &self,
        query: &Arc<Query>,
        chain: &mut Vec<PlanStep>,
        used: &mut [bool],
        plans: &mut Vec<QueryPlan>,
    ) {
        let parent_id = StepId(chain.len() - 1);
        let parent = &chain[parent_id.0];

        if parent.state.answered(true) && !parent.is_root() {
            plans.push(QueryPlan::new(Arc::clone(query), chain.clone()));
            return;
        }
        if parent_id.0 >= self.config.max_plan_depth {
            return;
        }

        let mut children: Vec<(Option<usize>, PlanStep)> = Vec::new();
        if !parent.is_terminal_residual() {
            for (position, index) in self.indexes.iter().enumerate() {
                if used[position] {
                    continue;
                }
                if let Some(step) =
                    IndexLookup::admit(self.model, &self.config, parent_id, parent, index)
                {
                    children.push((Some(position), step));
                }
            }
        }
        children.extend(
            apply_filter(self.model, &self.config, parent_id, parent)
                .into_iter()
                .chain(apply_sort(parent_id, parent))
                .chain(apply_limit(parent_id, parent))
                .map(|step| (None, step)),
        );

        for (position, step) in children {
            if let Some(position) = position {
                used[position] = true;
            }
            chain.push(step);
            self.extend(query, chain, used, plans);
            chain.pop();
            if let Some(position) = position {
                used[position] = false;
            }
        }
    }

    fn describe_query(&self, query: &Query) -> String {
        let select: Vec<String> = query
            .select()
            .iter()
            .map(|field| self.model.field_name(*field))
            .collect();
        let conditions: Vec<String> = query
            .conditions()
            .values()
            .map(|c| format!("{} {} ?", self.model.field_name(c.field), c.operator))
            .collect();
        format!(
            "SELECT {} FROM {} WHERE {}",
            select.join(", "),
            self.model.entity(query.entity()).name,
            conditions.join(" AND ")
        )
    }
}
