//! Per-statement planning context.

use std::sync::Arc;

use crate::catalog::{EntityId, EntityPath, FieldId, FieldSet, Model};
use crate::statement::Query;

/// Unresolved work for one query.
///
/// Every plan step owns the state produced by its own transition. A state is
/// cloned and edited to build the next step's state, never edited in place
/// once handed to a step.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    query: Arc<Query>,
    /// Selected fields not yet fetched.
    pub fields: FieldSet,
    /// Equality conditions not yet applied.
    pub eq: FieldSet,
    /// Range condition not yet applied.
    pub range: Option<FieldId>,
    /// Sort fields not yet resolved.
    pub order_by: Vec<FieldId>,
    /// Entities still to traverse, in planning order.
    pub path: EntityPath,
    /// Estimated number of rows produced so far.
    pub cardinality: f64,
    /// Estimated number of rows sharing one hash key.
    pub hash_cardinality: f64,
    /// Limit, once a step has fixed it.
    pub limit: Option<usize>,
}

impl QueryState {
    /// Initial state: everything the query asks for is outstanding.
    pub fn new(query: Arc<Query>) -> Self {
        Self {
            fields: query.select().clone(),
            eq: query.eq_fields(),
            range: query.range_field(),
            order_by: query.order().to_vec(),
            path: query.planning_path(),
            cardinality: 1.0,
            hash_cardinality: 1.0,
            limit: None,
            query,
        }
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    /// Fields whose values the query supplies.
    pub fn given_fields(&self) -> FieldSet {
        self.query.given_fields()
    }

    /// Whether nothing remains to fetch, filter or sort.
    ///
    /// With `check_limit`, a query with a limit is answered only once a step
    /// has fixed that limit.
    pub fn answered(&self, check_limit: bool) -> bool {
        let done = self.fields.is_empty()
            && self.eq.is_empty()
            && self.range.is_none()
            && self.order_by.is_empty();
        if !done {
            return false;
        }
        !check_limit || self.query.limit().is_none() || self.limit.is_some()
    }

    /// Outstanding filter and sort fields on `entities`, plus outstanding
    /// selected fields when `select` is set.
    pub fn fields_for_entities(&self, model: &Model, entities: &[EntityId], select: bool) -> FieldSet {
        let mut fields: FieldSet = self.eq.iter().chain(self.order_by.iter()).copied().collect();
        fields.extend(self.range);
        if select {
            fields.extend(self.fields.iter().copied());
        }
        fields.retain(|field| entities.contains(&model.field(*field).entity));
        fields
    }
}
