//! Row-count estimation along entity paths.

use crate::catalog::{FieldId, FieldSet, Index, Model, Relationship};
use crate::config::PlannerConfig;

/// Estimate the rows left after walking `index`'s path with filters applied.
///
/// Starting from `cardinality` rows of the first path entity, each hop
/// toward an entity whose foreign key points back at the previous one fans
/// out by the ratio of their row counts; a to-one hop keeps the estimate.
/// On every entity, equality filters divide by the field cardinality and
/// the range filter keeps `range_selectivity` of the rows. Never below 1.
pub fn estimate(
    model: &Model,
    config: &PlannerConfig,
    cardinality: f64,
    eq_filter: &FieldSet,
    range_filter: Option<FieldId>,
    index: &Index,
) -> f64 {
    let path = index.path();
    let keys = index.key_path().keys();
    let mut estimate = cardinality;

    for (position, entity) in path.iter().enumerate() {
        if position > 0 {
            // Planning order runs against the key path, so hop `position`
            // crosses the key counted from the end.
            let key = model.field(keys[keys.len() - position]);
            if key.relationship() == Some(Relationship::One) {
                let previous = model.entity(path[position - 1]).count.max(1) as f64;
                let next = model.entity(*entity).count.max(1) as f64;
                estimate *= next / previous;
            }
        }

        let on_entity = |field: &FieldId| model.field(*field).entity == *entity;
        estimate = filter(
            model,
            config,
            estimate,
            eq_filter.iter().filter(|field| on_entity(*field)),
            range_filter.filter(on_entity),
        );
    }

    estimate.max(1.0)
}

/// Apply equality and range selectivity without traversal.
pub fn filter<'a>(
    model: &Model,
    config: &PlannerConfig,
    cardinality: f64,
    eq_filter: impl IntoIterator<Item = &'a FieldId>,
    range_filter: Option<FieldId>,
) -> f64 {
    let mut estimate = cardinality;
    for field in eq_filter {
        estimate /= model.field_cardinality(*field) as f64;
    }
    if range_filter.is_some() {
        estimate *= config.range_selectivity;
    }
    estimate.max(1.0)
}
