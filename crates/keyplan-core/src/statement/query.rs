//! Parsed read statements.

use keyplan_proto::{Operator, Value};

use super::condition::{Condition, Conditions};
use crate::catalog::{EntityId, EntityPath, FieldId, FieldSet, KeyPath, Model};
use crate::error::{Error, Result};

/// A read over one key path.
///
/// The key path starts at the entity whose rows are produced and walks
/// foreign keys toward the entity the conditions are given on.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    key_path: KeyPath,
    select: FieldSet,
    conditions: Conditions,
    order: Vec<FieldId>,
    limit: Option<usize>,
}

impl Query {
    /// Validate and build a query.
    pub fn new(
        model: &Model,
        key_path: KeyPath,
        select: FieldSet,
        conditions: Conditions,
        order: Vec<FieldId>,
        limit: Option<usize>,
    ) -> Result<Self> {
        if select.is_empty() {
            return Err(Error::InvalidStatement("query selects no fields".into()));
        }
        if limit == Some(0) {
            return Err(Error::InvalidStatement("limit must be positive".into()));
        }
        if conditions.values().filter(|c| c.is_range()).count() > 1 {
            return Err(Error::InvalidStatement(
                "query has more than one range condition".into(),
            ));
        }
        if let Some((field, condition)) = conditions.iter().find(|(f, c)| **f != c.field) {
            return Err(Error::InvalidStatement(format!(
                "condition on '{}' keyed under '{}'",
                model.field_name(condition.field),
                model.field_name(*field)
            )));
        }

        let referenced = select
            .iter()
            .chain(conditions.keys())
            .chain(order.iter());
        for field in referenced {
            if !key_path.contains(model.field(*field).entity) {
                return Err(Error::InvalidStatement(format!(
                    "'{}' is not on the query path",
                    model.field_name(*field)
                )));
            }
        }

        Ok(Self {
            key_path,
            select,
            conditions,
            order,
            limit,
        })
    }

    /// Start building a query over `key_path`.
    pub fn builder(model: &Model, key_path: KeyPath) -> QueryBuilder<'_> {
        QueryBuilder::new(model, key_path)
    }

    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    /// Entity whose rows the query produces.
    pub fn entity(&self) -> EntityId {
        self.key_path.source()
    }

    pub fn select(&self) -> &FieldSet {
        &self.select
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn order(&self) -> &[FieldId] {
        &self.order
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Fields carrying an equality condition.
    pub fn eq_fields(&self) -> FieldSet {
        self.conditions
            .values()
            .filter(|c| !c.is_range())
            .map(|c| c.field)
            .collect()
    }

    /// The range condition, if any.
    pub fn range_condition(&self) -> Option<&Condition> {
        self.conditions.values().find(|c| c.is_range())
    }

    pub fn range_field(&self) -> Option<FieldId> {
        self.range_condition().map(|c| c.field)
    }

    /// Fields whose values are known before any lookup runs.
    pub fn given_fields(&self) -> FieldSet {
        self.eq_fields()
    }

    /// Every field the query mentions.
    pub fn all_fields(&self) -> FieldSet {
        let mut fields = self.select.clone();
        fields.extend(self.conditions.keys().copied());
        fields.extend(self.order.iter().copied());
        fields
    }

    /// Entities of the key path, from the produced entity outward.
    pub fn longest_entity_path(&self) -> EntityPath {
        self.key_path.entities()
    }

    /// Entities in planning order.
    pub fn planning_path(&self) -> EntityPath {
        self.key_path.planning_path()
    }
}

/// Builder resolving qualified field names against a model.
///
/// The first resolution failure is reported by [`build`](Self::build).
pub struct QueryBuilder<'a> {
    model: &'a Model,
    key_path: KeyPath,
    select: FieldSet,
    conditions: Conditions,
    order: Vec<FieldId>,
    limit: Option<usize>,
    error: Option<Error>,
}

impl<'a> QueryBuilder<'a> {
    fn new(model: &'a Model, key_path: KeyPath) -> Self {
        Self {
            model,
            key_path,
            select: FieldSet::new(),
            conditions: Conditions::new(),
            order: Vec::new(),
            limit: None,
            error: None,
        }
    }

    fn resolve(&mut self, name: &str) -> Option<FieldId> {
        match self.model.field_id(name) {
            Ok(field) => Some(field),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
                None
            }
        }
    }

    /// Select a field.
    pub fn select(mut self, name: &str) -> Self {
        if let Some(field) = self.resolve(name) {
            self.select.insert(field);
        }
        self
    }

    /// Add an equality condition with a literal.
    pub fn eq(self, name: &str, value: impl Into<Value>) -> Self {
        self.condition(name, Operator::Eq, Some(value.into()))
    }

    /// Add a range condition with a literal.
    pub fn range(self, name: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.condition(name, operator, Some(value.into()))
    }

    /// Add an unbound condition.
    pub fn param(self, name: &str, operator: Operator) -> Self {
        self.condition(name, operator, None)
    }

    fn condition(mut self, name: &str, operator: Operator, value: Option<Value>) -> Self {
        if let Some(field) = self.resolve(name) {
            self.conditions.insert(
                field,
                Condition {
                    field,
                    operator,
                    value,
                },
            );
        }
        self
    }

    /// Append a sort field.
    pub fn order_by(mut self, name: &str) -> Self {
        if let Some(field) = self.resolve(name) {
            self.order.push(field);
        }
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(self) -> Result<Query> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Query::new(
            self.model,
            self.key_path,
            self.select,
            self.conditions,
            self.order,
            self.limit,
        )
    }
}
