//! Logical data model: entities, fields, foreign-key paths and indexes.

pub mod entity;
pub mod field;
pub mod index;
pub mod key_path;
pub mod model;

use std::collections::BTreeSet;

pub use entity::{Entity, EntityDef, EntityId};
pub use field::{Field, FieldDef, FieldDefKind, FieldId, FieldKind, Relationship, ScalarType};
pub use index::Index;
pub use key_path::KeyPath;
pub use model::{Model, ModelBuilder};

/// An unordered set of fields.
pub type FieldSet = BTreeSet<FieldId>;

/// A sequence of entities in planning order.
pub type EntityPath = Vec<EntityId>;
