//! The data model arena and its two-phase builder.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::entity::{Entity, EntityDef, EntityId};
use super::field::{Field, FieldDefKind, FieldId, FieldKind};
use super::key_path::KeyPath;
use crate::error::{Error, Result};

/// Entities and fields of a logical data model.
///
/// Built once by [`ModelBuilder`] and read-only afterwards. Every other
/// structure refers to entities and fields through [`EntityId`] and
/// [`FieldId`] handles into this arena.
#[derive(Debug, Clone, Default)]
pub struct Model {
    entities: Vec<Entity>,
    fields: Vec<Field>,
    by_name: HashMap<String, EntityId>,
}

impl Model {
    /// Start declaring a model.
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Resolve an entity handle.
    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }

    /// Resolve a field handle.
    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    /// All entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Find an entity by name.
    pub fn entity_id(&self, name: &str) -> Result<EntityId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidModel(format!("unknown entity '{}'", name)))
    }

    /// Find a field by its qualified `Entity.field` name.
    pub fn field_id(&self, qualified: &str) -> Result<FieldId> {
        let (entity, field) = qualified.split_once('.').ok_or_else(|| {
            Error::InvalidModel(format!("field name '{}' is not qualified", qualified))
        })?;
        self.entity(self.entity_id(entity)?)
            .field(field)
            .ok_or_else(|| Error::InvalidModel(format!("unknown field '{}'", qualified)))
    }

    /// Find several fields by qualified name.
    pub fn field_set(&self, names: &[&str]) -> Result<BTreeSet<FieldId>> {
        names.iter().map(|name| self.field_id(name)).collect()
    }

    /// Qualified `Entity.field` name of a field.
    pub fn field_name(&self, id: FieldId) -> String {
        let field = self.field(id);
        format!("{}.{}", self.entity(field.entity).name, field.name)
    }

    /// Number of distinct values of a field.
    ///
    /// An explicit override wins; foreign keys take the target entity's row
    /// count and other fields the owning entity's row count. Never below 1.
    pub fn field_cardinality(&self, id: FieldId) -> u64 {
        let field = self.field(id);
        let cardinality = match (field.cardinality, field.kind) {
            (Some(cardinality), _) => cardinality,
            (None, FieldKind::ForeignKey { target, .. }) => self.entity(target).count,
            (None, _) => self.entity(field.entity).count,
        };
        cardinality.max(1)
    }

    /// Build a key path starting at `entity` and following the named foreign keys.
    pub fn key_path(&self, entity: &str, keys: &[&str]) -> Result<KeyPath> {
        let mut current = self.entity(self.entity_id(entity)?);
        let mut fields = vec![current.id_field()];
        for key in keys {
            let field = current.field(key).ok_or_else(|| {
                Error::InvalidModel(format!("unknown field '{}.{}'", current.name, key))
            })?;
            fields.push(field);
            let target = self.field(field).target().ok_or_else(|| {
                Error::InvalidModel(format!("'{}' is not a foreign key", self.field_name(field)))
            })?;
            current = self.entity(target);
        }
        KeyPath::new(self, fields)
    }
}

/// Two-phase model construction.
///
/// Entities are declared first; [`build`](Self::build) then registers every
/// entity and resolves foreign-key targets by name against that registry.
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityDef>,
}

impl ModelBuilder {
    /// Add an entity declaration.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Load entity declarations from a JSON array.
    pub fn from_json(json: &str) -> Result<Self> {
        let entities: Vec<EntityDef> =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(Self { entities })
    }

    /// Resolve all declarations into a model.
    pub fn build(self) -> Result<Model> {
        let mut by_name = HashMap::with_capacity(self.entities.len());
        for (position, def) in self.entities.iter().enumerate() {
            let id = EntityId(position as u32);
            if by_name.insert(def.name.clone(), id).is_some() {
                return Err(Error::InvalidModel(format!(
                    "duplicate entity '{}'",
                    def.name
                )));
            }
        }

        let mut entities = Vec::with_capacity(self.entities.len());
        let mut fields = Vec::new();
        for (position, def) in self.entities.into_iter().enumerate() {
            let entity_id = EntityId(position as u32);
            let mut entity = Entity {
                id: entity_id,
                name: def.name,
                count: def.count,
                fields: Vec::with_capacity(def.fields.len()),
                id_fields: Vec::new(),
                by_name: HashMap::with_capacity(def.fields.len()),
            };

            for field_def in def.fields {
                let field_id = FieldId(fields.len() as u32);
                let size = field_def.resolved_size();
                let kind = match field_def.kind {
                    FieldDefKind::Scalar(scalar) => FieldKind::Scalar(scalar),
                    FieldDefKind::Id => FieldKind::Id,
                    FieldDefKind::ForeignKey {
                        target,
                        relationship,
                    } => {
                        let target = by_name.get(&target).copied().ok_or_else(|| {
                            Error::InvalidModel(format!(
                                "foreign key '{}.{}' references unknown entity '{}'",
                                entity.name, field_def.name, target
                            ))
                        })?;
                        FieldKind::ForeignKey {
                            target,
                            relationship,
                        }
                    }
                };

                if entity
                    .by_name
                    .insert(field_def.name.clone(), field_id)
                    .is_some()
                {
                    return Err(Error::InvalidModel(format!(
                        "duplicate field '{}.{}'",
                        entity.name, field_def.name
                    )));
                }
                if kind == FieldKind::Id {
                    entity.id_fields.push(field_id);
                }
                entity.fields.push(field_id);
                fields.push(Field {
                    id: field_id,
                    entity: entity_id,
                    name: field_def.name,
                    kind,
                    size,
                    cardinality: field_def.cardinality,
                });
            }

            if entity.id_fields.is_empty() {
                return Err(Error::InvalidModel(format!(
                    "entity '{}' has no identifier field",
                    entity.name
                )));
            }
            entities.push(entity);
        }

        debug!(
            entities = entities.len(),
            fields = fields.len(),
            "built data model"
        );

        Ok(Model {
            entities,
            fields,
            by_name,
        })
    }
}
