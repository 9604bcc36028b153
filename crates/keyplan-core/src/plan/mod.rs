//! Query planning: state, step admission, residual steps and plan search.

pub mod cardinality;
pub mod cost;
pub mod lookup;
pub mod residual;
pub mod search;
pub mod state;
pub mod step;
pub mod update;

pub use cost::{CostEstimate, CostModel};
pub use lookup::IndexLookup;
pub use residual::{apply_filter, apply_limit, apply_sort};
pub use search::Planner;
pub use state::QueryState;
pub use step::{PlanStep, QueryPlan, StepId, StepKind};
pub use update::{SupportQueries, UpdatePlan, UpdatePlanner};
