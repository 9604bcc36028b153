//! Residual steps: work no index lookup resolved.

use tracing::trace;

use super::cardinality;
use super::step::{PlanStep, StepId, StepKind};
use crate::catalog::{FieldId, FieldSet, Model};
use crate::config::PlannerConfig;

/// Filter fetched rows on the remaining equality and range conditions.
///
/// Applicable once every remaining condition field has been fetched.
pub fn apply_filter(
    model: &Model,
    config: &PlannerConfig,
    parent_id: StepId,
    parent: &PlanStep,
) -> Option<PlanStep> {
    let state = &parent.state;
    if parent.is_root() || parent.is_terminal_residual() {
        return None;
    }
    if state.eq.is_empty() && state.range.is_none() {
        return None;
    }
    let fetched = |field: &FieldId| parent.fields.contains(field);
    if !state.eq.iter().all(fetched) || !state.range.iter().all(fetched) {
        trace!("filter rejected: condition fields not fetched");
        return None;
    }

    let mut next = state.clone();
    let eq = std::mem::take(&mut next.eq);
    let range = next.range.take();
    next.cardinality = cardinality::filter(model, config, next.cardinality, &eq, range);

    Some(parent.child(
        parent_id,
        StepKind::Filter { eq, range },
        next,
        &FieldSet::new(),
    ))
}

/// Sort fetched rows on the remaining sort fields.
///
/// Applicable when filtering is done, all selected fields are fetched and
/// every sort field is available.
pub fn apply_sort(parent_id: StepId, parent: &PlanStep) -> Option<PlanStep> {
    let state = &parent.state;
    if parent.is_root() || parent.is_terminal_residual() {
        return None;
    }
    if !state.eq.is_empty() || state.range.is_some() || !state.fields.is_empty() {
        return None;
    }
    if state.order_by.is_empty() {
        return None;
    }
    if !state.order_by.iter().all(|field| parent.fields.contains(field)) {
        trace!("sort rejected: sort fields not fetched");
        return None;
    }

    let mut next = state.clone();
    let fields = std::mem::take(&mut next.order_by);
    Some(parent.child(parent_id, StepKind::Sort { fields }, next, &FieldSet::new()))
}

/// Truncate to the query's limit once everything else is answered.
pub fn apply_limit(parent_id: StepId, parent: &PlanStep) -> Option<PlanStep> {
    let state = &parent.state;
    if parent.is_root() || !state.answered(false) || state.limit.is_some() {
        return None;
    }
    let limit = state.query().limit()?;

    let mut next = state.clone();
    next.limit = Some(limit);
    next.cardinality = next.cardinality.min(limit as f64);
    next.hash_cardinality = next.hash_cardinality.min(limit as f64);
    Some(parent.child(parent_id, StepKind::Limit { limit }, next, &FieldSet::new()))
}
