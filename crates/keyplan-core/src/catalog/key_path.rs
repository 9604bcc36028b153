//! Foreign-key traversal paths.

use super::entity::EntityId;
use super::field::FieldId;
use super::model::Model;
use crate::error::{Error, Result};

/// An ordered traversal of denormalization relationships.
///
/// The first field is an identifier of the source entity; every following
/// field is a foreign key of the entity reached by the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    fields: Vec<FieldId>,
    entities: Vec<EntityId>,
}

impl KeyPath {
    /// Validate a field chain against the model.
    pub fn new(model: &Model, fields: Vec<FieldId>) -> Result<Self> {
        let first = *fields
            .first()
            .ok_or_else(|| Error::InvalidModel("key path must not be empty".into()))?;
        if !model.field(first).is_id() {
            return Err(Error::InvalidModel(format!(
                "key path must start at an identifier, got '{}'",
                model.field_name(first)
            )));
        }

        let mut entities = vec![model.field(first).entity];
        for &key in &fields[1..] {
            let field = model.field(key);
            let current = entities[entities.len() - 1];
            if field.entity != current {
                return Err(Error::InvalidModel(format!(
                    "'{}' does not belong to '{}'",
                    model.field_name(key),
                    model.entity(current).name
                )));
            }
            let target = field.target().ok_or_else(|| {
                Error::InvalidModel(format!("'{}' is not a foreign key", model.field_name(key)))
            })?;
            entities.push(target);
        }

        Ok(Self { fields, entities })
    }

    /// Single-entity path.
    pub fn entity(model: &Model, entity: EntityId) -> Self {
        Self {
            fields: vec![model.entity(entity).id_field()],
            entities: vec![entity],
        }
    }

    /// Fields of the path in traversal order.
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    /// Foreign keys traversed, in order.
    pub fn keys(&self) -> &[FieldId] {
        &self.fields[1..]
    }

    /// The source entity followed by the target of each foreign key.
    pub fn entities(&self) -> Vec<EntityId> {
        self.entities.clone()
    }

    /// Source entity.
    pub fn source(&self) -> EntityId {
        self.entities[0]
    }

    /// Last entity reached.
    pub fn target(&self) -> EntityId {
        self.entities[self.entities.len() - 1]
    }

    /// Number of entities on the path.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Always false; a key path holds at least one field.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether `entity` is on the path.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Longest shared leading field sequence.
    pub fn common_prefix(&self, other: &KeyPath) -> Vec<FieldId> {
        self.fields
            .iter()
            .zip(other.fields.iter())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| *a)
            .collect()
    }

    /// Reverse traversal order: the entity where input values are known first.
    pub fn planning_path(&self) -> Vec<EntityId> {
        self.entities.iter().rev().copied().collect()
    }
}
