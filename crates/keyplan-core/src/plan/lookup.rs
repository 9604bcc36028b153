//! Index-lookup admission and state transition.
//!
//! [`IndexLookup::admit`] decides whether a candidate index can serve as the
//! next hop after a parent step. Rejection is ordinary control flow: it
//! returns `None` and logs the failed rule at trace level.

use std::sync::Arc;

use tracing::{debug, trace};

use super::cardinality;
use super::step::{PlanStep, StepId, StepKind};
use crate::catalog::{FieldId, FieldSet, Index, Model};
use crate::config::PlannerConfig;

/// A lookup of rows in one index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLookup {
    pub index: Arc<Index>,
    /// Sort fields this lookup resolves.
    pub order_by: Vec<FieldId>,
    /// Limit fixed by this lookup.
    pub limit: Option<usize>,
    /// Equality conditions applied by the lookup key.
    pub eq_filter: FieldSet,
    /// Range condition applied by the clustering order.
    pub range_filter: Option<FieldId>,
}

impl IndexLookup {
    /// Try to extend the plan ending at `parent` (at position `parent_id`)
    /// with a lookup in `index`.
    pub fn admit(
        model: &Model,
        config: &PlannerConfig,
        parent_id: StepId,
        parent: &PlanStep,
        index: &Arc<Index>,
    ) -> Option<PlanStep> {
        let state = &parent.state;
        let index_path = index.path();

        // The index must be the next hop on the remaining path
        if state.path.len() < index_path.len() || state.path[..index_path.len()] != *index_path {
            trace!(index = index.key(), "rejected: path does not align");
            return None;
        }

        // Only move forward along the path
        if index_path.len() == 1 && state.path.len() > 1 && !parent.is_root() {
            trace!(index = index.key(), "rejected: single-entity detour mid-path");
            return None;
        }
        if index.is_identity() && state.path.len() != 1 {
            trace!(index = index.key(), "rejected: identity lookup before path end");
            return None;
        }

        // If the previous lookup gave ids, they must key this one
        if let Some(parent_index) = &parent.latest_index {
            let last = parent_index.path()[parent_index.path().len() - 1];
            let parent_ids: FieldSet = model.entity(last).id_fields.iter().copied().collect();
            let has_ids = parent_ids.is_subset(parent_index.all_fields());
            let fresh_path = index_path.len() == 1 && parent_index.path() != index_path;
            if has_ids && *index.hash_fields() != parent_ids && !fresh_path {
                trace!(index = index.key(), "rejected: not keyed by parent ids");
                return None;
            }
        }

        // Every hash field must be known
        let given = state.given_fields();
        if !index
            .hash_fields()
            .iter()
            .all(|field| parent.fields.contains(field) || given.contains(field))
        {
            trace!(index = index.key(), "rejected: hash fields unavailable");
            return None;
        }

        // Filter and sort fields on the index path must be servable here
        let relevant = state.fields_for_entities(model, index_path, false);
        let path_fields: FieldSet = relevant.difference(&parent.fields).copied().collect();
        if !path_fields.is_subset(index.all_fields()) {
            trace!(index = index.key(), "rejected: path fields not covered");
            return None;
        }

        // The lookup must contribute something not already fetched
        let wanted = state.fields_for_entities(model, index_path, true);
        let contributes = wanted
            .iter()
            .any(|field| index.all_fields().contains(field) && !parent.fields.contains(field));
        if !wanted.is_empty() && !contributes {
            trace!(index = index.key(), "rejected: lookup is a no-op");
            return None;
        }

        // Must yield ids to continue the path, or the final output
        let provides = |fields: &[FieldId]| fields.iter().all(|f| index.all_fields().contains(f));
        let last = index_path[index_path.len() - 1];
        let mut has_last_fields = provides(model.entity(last).id_fields.as_slice());
        if let Some(next) = state.path.get(index_path.len()) {
            has_last_fields |= provides(model.entity(*next).id_fields.as_slice());
        }
        if state.path == index_path {
            has_last_fields |= state.fields.is_subset(index.all_fields());
        }
        if !has_last_fields {
            trace!(index = index.key(), "rejected: no ids or output to carry forward");
            return None;
        }

        let step = Self::transition(model, config, parent_id, parent, index);
        debug!(
            index = index.key(),
            cardinality = step.state.cardinality,
            answered = step.state.answered(false),
            "admitted index lookup"
        );
        Some(step)
    }

    /// Fields of `index` this lookup fetches for the query.
    ///
    /// Key fields always, plus extra fields the query mentions or that
    /// identify an entity on the path.
    pub fn fetched_fields(model: &Model, index: &Index, query_fields: &FieldSet) -> FieldSet {
        let mut fields: FieldSet = index.hash_fields().clone();
        fields.extend(index.order_fields().iter().copied());
        fields.extend(index.extra().iter().copied().filter(|field| {
            query_fields.contains(field) || model.field(*field).is_id()
        }));
        fields
    }

    fn transition(
        model: &Model,
        config: &PlannerConfig,
        parent_id: StepId,
        parent: &PlanStep,
        index: &Arc<Index>,
    ) -> PlanStep {
        let mut state = parent.state.clone();
        let hash = index.hash_fields();
        let order = index.order_fields();

        // Equality (then at most one range) fields answered by a prefix of the order
        let mut prefix_candidates: FieldSet = state
            .eq
            .iter()
            .filter(|field| !hash.contains(field) && order.contains(field))
            .copied()
            .collect();
        prefix_candidates.extend(state.range);
        let mut order_prefix = Vec::new();
        for field in order {
            if !prefix_candidates.contains(field) {
                break;
            }
            order_prefix.push(*field);
            if Some(*field) == state.range {
                break;
            }
        }

        let eq_filter: FieldSet = state
            .eq
            .iter()
            .filter(|field| hash.contains(field) || order_prefix.contains(field))
            .copied()
            .collect();
        let range_filter = state.range.filter(|range| order_prefix.contains(range));
        if range_filter.is_some() {
            state.range = None;
        }

        state.fields.retain(|field| !index.all_fields().contains(field));
        state.eq.retain(|field| !eq_filter.contains(field));

        // Ordering resolves only when keyed by the first entity's ids and
        // the matched sort fields belong to that entity
        let first = index.path()[0];
        let first_ids: FieldSet = model.entity(first).id_fields.iter().copied().collect();
        let common: Vec<FieldId> = state
            .order_by
            .iter()
            .zip(order.iter())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| *a)
            .collect();
        let order_by = if *hash == first_ids
            && !common.is_empty()
            && common.iter().all(|field| model.field(*field).entity == first)
        {
            state.order_by.drain(..common.len());
            common
        } else {
            Vec::new()
        };

        // Keep the last entity unless everything on this path is resolved
        let remaining = state.fields_for_entities(model, index.path(), true);
        if remaining.is_empty() && state.path == index.path() {
            state.path.drain(..index.path().len());
        } else {
            state.path.drain(..index.path().len() - 1);
        }

        let query = Arc::clone(state.query());
        let mut limit = None;
        match query.limit() {
            Some(query_limit) if state.answered(false) => {
                state.cardinality = query_limit as f64;
                state.hash_cardinality = query_limit as f64;
                state.limit = Some(query_limit);
                limit = Some(query_limit);
            }
            _ => {
                if parent.is_root() {
                    let path = query.longest_entity_path();
                    let seed = model.entity(path[path.len() - 1]).count.max(1) as f64;
                    state.cardinality = seed;
                    state.hash_cardinality = seed;
                }
                state.cardinality = cardinality::estimate(
                    model,
                    config,
                    state.cardinality,
                    &eq_filter,
                    range_filter,
                    index,
                );
                let hash_filter: FieldSet = eq_filter.intersection(hash).copied().collect();
                state.hash_cardinality = cardinality::estimate(
                    model,
                    config,
                    state.hash_cardinality,
                    &hash_filter,
                    None,
                    index,
                );
            }
        }

        let fetched = Self::fetched_fields(model, index, &query.all_fields());
        let lookup = IndexLookup {
            index: Arc::clone(index),
            order_by,
            limit,
            eq_filter,
            range_filter,
        };
        parent.child(parent_id, StepKind::IndexLookup(lookup), state, &fetched)
    }
}
