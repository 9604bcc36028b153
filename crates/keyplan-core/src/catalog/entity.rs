//! Entity descriptors.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::field::{FieldDef, FieldId};

/// Handle of an entity inside a [`Model`](super::Model) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    /// Raw arena position.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A record type resolved inside a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    /// Estimated number of rows.
    pub count: u64,
    /// Fields in declaration order.
    pub fields: Vec<FieldId>,
    /// Identifier fields in declaration order.
    pub id_fields: Vec<FieldId>,
    pub(crate) by_name: HashMap<String, FieldId>,
}

impl Entity {
    /// Look up a field of this entity by its unqualified name.
    pub fn field(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    /// Primary identifier field.
    pub fn id_field(&self) -> FieldId {
        // Every built entity has at least one identifier.
        self.id_fields[0]
    }
}

/// Default row-count estimate for an entity.
pub const DEFAULT_COUNT: u64 = 1;

/// An entity declaration consumed by [`ModelBuilder`](super::ModelBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    /// Estimated number of rows.
    pub count: u64,
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    /// Create a new entity declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: DEFAULT_COUNT,
            fields: Vec::new(),
        }
    }

    /// Set the row-count estimate.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}
