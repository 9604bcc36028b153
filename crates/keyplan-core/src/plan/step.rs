//! Plan steps and the plan arena.

use std::fmt;
use std::sync::Arc;

use super::lookup::IndexLookup;
use super::state::QueryState;
use crate::catalog::{FieldId, FieldSet, Index, Model};
use crate::statement::Query;

/// Position of a step inside its [`QueryPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub usize);

/// What a plan step does.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Initial step holding the untouched state.
    Root,
    /// Fetch rows from an index.
    IndexLookup(IndexLookup),
    /// In-memory filtering of fetched rows.
    Filter {
        eq: FieldSet,
        range: Option<FieldId>,
    },
    /// In-memory sort of fetched rows.
    Sort { fields: Vec<FieldId> },
    /// Truncate the row set.
    Limit { limit: usize },
    /// Write rows into an index.
    Insert { index: Arc<Index>, fields: FieldSet },
    /// Remove rows from an index.
    Delete { index: Arc<Index> },
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Root => "root",
            StepKind::IndexLookup(_) => "lookup",
            StepKind::Filter { .. } => "filter",
            StepKind::Sort { .. } => "sort",
            StepKind::Limit { .. } => "limit",
            StepKind::Insert { .. } => "insert",
            StepKind::Delete { .. } => "delete",
        }
    }
}

/// One step of a query plan with the state after its transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub kind: StepKind,
    /// Previous step; `None` only for the root.
    pub parent: Option<StepId>,
    /// State after this step.
    pub state: QueryState,
    /// Fields fetched by this step and its ancestors.
    pub fields: FieldSet,
    /// Index of the nearest lookup at or above this step.
    pub latest_index: Option<Arc<Index>>,
}

impl PlanStep {
    /// Root step for a query.
    pub fn root(query: Arc<Query>) -> Self {
        Self {
            kind: StepKind::Root,
            parent: None,
            state: QueryState::new(query),
            fields: FieldSet::new(),
            latest_index: None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, StepKind::Root)
    }

    /// The lookup this step performs, if any.
    pub fn lookup(&self) -> Option<&IndexLookup> {
        match &self.kind {
            StepKind::IndexLookup(lookup) => Some(lookup),
            _ => None,
        }
    }

    /// Whether only a limit may follow this step.
    pub fn is_terminal_residual(&self) -> bool {
        matches!(self.kind, StepKind::Sort { .. } | StepKind::Limit { .. })
    }

    /// Child of this step, which sits at position `at` in its plan.
    pub(crate) fn child(
        &self,
        at: StepId,
        kind: StepKind,
        state: QueryState,
        fetched: &FieldSet,
    ) -> PlanStep {
        let latest_index = match &kind {
            StepKind::IndexLookup(lookup) => Some(Arc::clone(&lookup.index)),
            _ => self.latest_index.clone(),
        };
        let mut fields = self.fields.clone();
        fields.extend(fetched.iter().copied());
        PlanStep {
            kind,
            parent: Some(at),
            state,
            fields,
            latest_index,
        }
    }
}

/// A chain of admitted steps answering one query.
///
/// `steps[0]` is the root; each later step's parent is the one before it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    query: Arc<Query>,
    steps: Vec<PlanStep>,
}

impl QueryPlan {
    /// Wrap a chain of steps starting at the root.
    pub fn new(query: Arc<Query>, steps: Vec<PlanStep>) -> Self {
        Self { query, steps }
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Resolve a step handle.
    pub fn step(&self, id: StepId) -> &PlanStep {
        &self.steps[id.0]
    }

    /// Last step of the chain.
    pub fn last(&self) -> &PlanStep {
        &self.steps[self.steps.len() - 1]
    }

    /// Final state.
    pub fn state(&self) -> &QueryState {
        &self.last().state
    }

    /// Whether the final state answers the query, limit included.
    pub fn is_answered(&self) -> bool {
        self.state().answered(true)
    }

    /// Steps after the root.
    pub fn body(&self) -> &[PlanStep] {
        &self.steps[1..]
    }

    /// Indexes looked up, in order.
    pub fn indexes(&self) -> Vec<Arc<Index>> {
        self.steps
            .iter()
            .filter_map(|step| step.lookup().map(|lookup| Arc::clone(&lookup.index)))
            .collect()
    }

    /// Human-readable rendering, one step per line.
    pub fn describe(&self, model: &Model) -> String {
        self.body()
            .iter()
            .map(|step| match &step.kind {
                StepKind::IndexLookup(lookup) => {
                    format!("lookup {} * {:.1}", lookup.index.describe(model), step.state.cardinality)
                }
                other => format!("{} * {:.1}", other.name(), step.state.cardinality),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .body()
            .iter()
            .map(|step| match &step.kind {
                StepKind::IndexLookup(lookup) => format!("lookup({})", lookup.index.key()),
                other => other.name().to_string(),
            })
            .collect();
        write!(f, "{}", names.join(" -> "))
    }
}
