//! Planner and execution configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default selectivity applied by a range filter.
pub const DEFAULT_RANGE_SELECTIVITY: f64 = 0.1;

/// Default maximum number of steps in an enumerated plan (excluding the root).
pub const DEFAULT_MAX_PLAN_DEPTH: usize = 8;

/// Tunable policy for cardinality estimation and plan search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Fraction of rows a range condition keeps.
    pub range_selectivity: f64,
    /// Maximum number of steps the reference planner stacks on the root.
    pub max_plan_depth: usize,
    /// Cost of one backend request.
    pub request_weight: f64,
    /// Cost of one row returned by the backend.
    pub row_weight: f64,
    /// Cost of one row processed in memory (filter, sort).
    pub cpu_weight: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            range_selectivity: DEFAULT_RANGE_SELECTIVITY,
            max_plan_depth: DEFAULT_MAX_PLAN_DEPTH,
            request_weight: 10.0,
            row_weight: 1.0,
            cpu_weight: 0.1,
        }
    }
}

impl PlannerConfig {
    /// Parse a configuration from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the range selectivity.
    pub fn with_range_selectivity(mut self, selectivity: f64) -> Self {
        self.range_selectivity = selectivity;
        self
    }

    /// Set the maximum plan depth.
    pub fn with_max_plan_depth(mut self, depth: usize) -> Self {
        self.max_plan_depth = depth;
        self
    }

    /// Set the cost weights.
    pub fn with_weights(mut self, request: f64, row: f64, cpu: f64) -> Self {
        self.request_weight = request;
        self.row_weight = row;
        self.cpu_weight = cpu;
        self
    }

    /// Check that the selectivity is a fraction and the depth is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.range_selectivity > 0.0 && self.range_selectivity <= 1.0) {
            return Err(Error::InvalidModel(format!(
                "range selectivity must be in (0, 1], got {}",
                self.range_selectivity
            )));
        }
        if self.max_plan_depth == 0 {
            return Err(Error::InvalidModel("max plan depth must be positive".into()));
        }
        Ok(())
    }
}

/// Options for running prepared statements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Run per-identifier support queries on the rayon pool.
    pub parallel_support: bool,
}

impl ExecutionConfig {
    /// Parse a configuration from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Enable or disable parallel support resolution.
    pub fn with_parallel_support(mut self, parallel: bool) -> Self {
        self.parallel_support = parallel;
        self
    }
}
