//! Cost model for choosing among admissible plans.

use super::step::{PlanStep, QueryPlan, StepKind};
use crate::config::PlannerConfig;

/// Cost estimate for a plan or a single step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostEstimate {
    /// Backend requests issued.
    pub requests: f64,
    /// Rows returned by the backend.
    pub rows: f64,
    /// Rows processed in memory.
    pub cpu_rows: f64,
    /// Weighted total.
    pub total_cost: f64,
}

impl CostEstimate {
    /// Create an estimate, weighting each component.
    pub fn new(model: &CostModel, requests: f64, rows: f64, cpu_rows: f64) -> Self {
        let total_cost = requests * model.request_weight
            + rows * model.row_weight
            + cpu_rows * model.cpu_weight;
        Self {
            requests,
            rows,
            cpu_rows,
            total_cost,
        }
    }

    /// Create a zero-cost estimate.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Add another cost estimate to this one.
    pub fn add(&self, other: &CostEstimate) -> CostEstimate {
        CostEstimate {
            requests: self.requests + other.requests,
            rows: self.rows + other.rows,
            cpu_rows: self.cpu_rows + other.cpu_rows,
            total_cost: self.total_cost + other.total_cost,
        }
    }
}

/// Weighted cost of plan steps.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    request_weight: f64,
    row_weight: f64,
    cpu_weight: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

impl CostModel {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            request_weight: config.request_weight,
            row_weight: config.row_weight,
            cpu_weight: config.cpu_weight,
        }
    }

    /// Cost of `step` following `parent`.
    ///
    /// A lookup issues one request per parent row and returns the step's
    /// rows; filters and sorts touch every incoming row; limits are free.
    pub fn step_cost(&self, parent: &PlanStep, step: &PlanStep) -> CostEstimate {
        match &step.kind {
            StepKind::IndexLookup(_) => CostEstimate::new(
                self,
                parent.state.cardinality,
                step.state.cardinality,
                0.0,
            ),
            StepKind::Filter { .. } | StepKind::Sort { .. } => {
                CostEstimate::new(self, 0.0, 0.0, parent.state.cardinality)
            }
            StepKind::Root
            | StepKind::Limit { .. }
            | StepKind::Insert { .. }
            | StepKind::Delete { .. } => CostEstimate::zero(),
        }
    }

    /// Total cost of a plan.
    pub fn plan_cost(&self, plan: &QueryPlan) -> CostEstimate {
        plan.steps()
            .windows(2)
            .fold(CostEstimate::zero(), |total, pair| {
                total.add(&self.step_cost(&pair[0], &pair[1]))
            })
    }
}
