//! Field descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::EntityId;

/// Handle of a field inside a [`Model`](super::Model) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub(crate) u32);

impl FieldId {
    /// Raw arena position.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Numeric form used by storage encodings.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Rebuild a handle from its numeric form.
    pub fn from_u32(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type of an ordinary (non-key) field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Integer,
    Float,
    /// Fixed-length string; the length is the estimated size in bytes.
    String { length: usize },
    Date,
    Boolean,
}

impl ScalarType {
    /// String with the default length.
    pub const fn string() -> Self {
        ScalarType::String { length: 10 }
    }

    /// Estimated size of a stored value in bytes.
    pub fn default_size(&self) -> usize {
        match self {
            ScalarType::Integer | ScalarType::Float | ScalarType::Date => 8,
            ScalarType::String { length } => *length,
            ScalarType::Boolean => 1,
        }
    }
}

/// Direction of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relationship {
    /// Each row references one target row.
    One,
    /// Each row is referenced by many target rows.
    Many,
}

/// Type tag of a resolved field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar(ScalarType),
    /// Identifier, unique within its entity.
    Id,
    /// Reference to another entity.
    ForeignKey {
        target: EntityId,
        relationship: Relationship,
    },
}

/// Size in bytes of identifiers and foreign keys.
pub const KEY_SIZE: usize = 16;

/// A field resolved inside a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: FieldId,
    /// Owning entity.
    pub entity: EntityId,
    pub name: String,
    pub kind: FieldKind,
    /// Estimated size in bytes.
    pub size: usize,
    /// Number of distinct values, when declared explicitly.
    pub cardinality: Option<u64>,
}

impl Field {
    pub fn is_id(&self) -> bool {
        matches!(self.kind, FieldKind::Id)
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, FieldKind::ForeignKey { .. })
    }

    /// Target entity of a foreign key.
    pub fn target(&self) -> Option<EntityId> {
        match self.kind {
            FieldKind::ForeignKey { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Relationship of a foreign key.
    pub fn relationship(&self) -> Option<Relationship> {
        match self.kind {
            FieldKind::ForeignKey { relationship, .. } => Some(relationship),
            _ => None,
        }
    }
}

/// Declared kind of a field before foreign keys are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldDefKind {
    Scalar(ScalarType),
    Id,
    /// Foreign key naming its target entity.
    ForeignKey {
        target: String,
        relationship: Relationship,
    },
}

/// A field declaration consumed by [`ModelBuilder`](super::ModelBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldDefKind,
    /// Size override in bytes.
    pub size: Option<usize>,
    /// Distinct value count override.
    pub cardinality: Option<u64>,
}

impl FieldDef {
    /// Declare an ordinary field.
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            kind: FieldDefKind::Scalar(scalar),
            size: None,
            cardinality: None,
        }
    }

    /// Declare an identifier field.
    pub fn id(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldDefKind::Id,
            size: None,
            cardinality: None,
        }
    }

    /// Declare a foreign key to the entity named `target`.
    pub fn foreign_key(
        name: impl Into<String>,
        target: impl Into<String>,
        relationship: Relationship,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldDefKind::ForeignKey {
                target: target.into(),
                relationship,
            },
            size: None,
            cardinality: None,
        }
    }

    /// Override the estimated size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Override the distinct value count.
    pub fn with_cardinality(mut self, cardinality: u64) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    pub(crate) fn resolved_size(&self) -> usize {
        self.size.unwrap_or(match &self.kind {
            FieldDefKind::Scalar(scalar) => scalar.default_size(),
            FieldDefKind::Id | FieldDefKind::ForeignKey { .. } => KEY_SIZE,
        })
    }
}
