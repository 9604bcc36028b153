//! Materialized index descriptors.

use std::fmt;

use super::entity::EntityId;
use super::field::FieldId;
use super::key_path::KeyPath;
use super::model::Model;
use super::{EntityPath, FieldSet};
use crate::error::{Error, Result};

/// A materialized view over an entity path.
///
/// Rows are located by equality on the hash fields, clustered by the order
/// fields, and carry the extra fields alongside. The three field groups are
/// pairwise disjoint and every field belongs to an entity on the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Index {
    hash_fields: FieldSet,
    order_fields: Vec<FieldId>,
    extra: FieldSet,
    key_path: KeyPath,
    path: EntityPath,
    all_fields: FieldSet,
    identity: bool,
    identity_key_fields: Vec<FieldId>,
    entry_size: usize,
    size: u64,
    key: String,
}

impl Index {
    /// Validate and build an index.
    pub fn new(
        model: &Model,
        hash_fields: impl IntoIterator<Item = FieldId>,
        order_fields: Vec<FieldId>,
        extra: impl IntoIterator<Item = FieldId>,
        key_path: KeyPath,
    ) -> Result<Self> {
        let hash_fields: FieldSet = hash_fields.into_iter().collect();
        let extra: FieldSet = extra.into_iter().collect();

        if hash_fields.is_empty() {
            return Err(Error::InvalidModel("index needs at least one hash field".into()));
        }

        let mut all_fields = hash_fields.clone();
        for field in order_fields.iter().chain(extra.iter()) {
            if !all_fields.insert(*field) {
                return Err(Error::InvalidModel(format!(
                    "'{}' appears in more than one index field group",
                    model.field_name(*field)
                )));
            }
        }

        if let Some(stray) = all_fields
            .iter()
            .find(|field| !key_path.contains(model.field(**field).entity))
        {
            return Err(Error::InvalidModel(format!(
                "'{}' is not on the index path",
                model.field_name(*stray)
            )));
        }

        let path = key_path.planning_path();
        let identity =
            path.len() == 1 && hash_fields.iter().eq(sorted(&model.entity(path[0]).id_fields).iter());

        let mut identity_key_fields: Vec<FieldId> = hash_fields.iter().copied().collect();
        identity_key_fields.extend(order_fields.iter().copied());
        for entity in &path {
            identity_key_fields.extend(
                model
                    .entity(*entity)
                    .id_fields
                    .iter()
                    .filter(|id| extra.contains(*id)),
            );
        }
        // Without every path entity's ids, only the full entry tells entries apart.
        let ids_stored = path.iter().all(|entity| {
            model
                .entity(*entity)
                .id_fields
                .iter()
                .all(|id| all_fields.contains(id))
        });
        if !ids_stored {
            let remaining: Vec<FieldId> = extra
                .iter()
                .copied()
                .filter(|field| !identity_key_fields.contains(field))
                .collect();
            identity_key_fields.extend(remaining);
        }

        let entry_size = all_fields.iter().map(|field| model.field(*field).size).sum();
        let entries = path
            .iter()
            .map(|entity| model.entity(*entity).count)
            .max()
            .unwrap_or(1);
        let size = entry_size as u64 * entries;

        let key = structural_key(&hash_fields, &order_fields, &extra, key_path.fields());

        Ok(Self {
            hash_fields,
            order_fields,
            extra,
            key_path,
            path,
            all_fields,
            identity,
            identity_key_fields,
            entry_size,
            size,
            key,
        })
    }

    /// Build an index from qualified field names.
    pub fn from_names(
        model: &Model,
        hash_fields: &[&str],
        order_fields: &[&str],
        extra: &[&str],
        key_path: KeyPath,
    ) -> Result<Self> {
        let hash = model.field_set(hash_fields)?;
        let order = order_fields
            .iter()
            .map(|name| model.field_id(name))
            .collect::<Result<Vec<_>>>()?;
        let extra = model.field_set(extra)?;
        Self::new(model, hash, order, extra, key_path)
    }

    /// Build the identity index of an entity: keyed by its ids, storing every other field.
    pub fn identity_of(model: &Model, entity: EntityId) -> Result<Self> {
        let entity_ref = model.entity(entity);
        let extra = entity_ref
            .fields
            .iter()
            .copied()
            .filter(|field| !entity_ref.id_fields.contains(field));
        Self::new(
            model,
            entity_ref.id_fields.iter().copied(),
            Vec::new(),
            extra,
            KeyPath::entity(model, entity),
        )
    }

    pub fn hash_fields(&self) -> &FieldSet {
        &self.hash_fields
    }

    pub fn order_fields(&self) -> &[FieldId] {
        &self.order_fields
    }

    pub fn extra(&self) -> &FieldSet {
        &self.extra
    }

    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    /// Entity path in planning order.
    pub fn path(&self) -> &[EntityId] {
        &self.path
    }

    /// Union of hash, order and extra fields.
    pub fn all_fields(&self) -> &FieldSet {
        &self.all_fields
    }

    /// Whether the hash fields are exactly the id fields of a single-entity path.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Fields that identify one entry: hash fields, order fields, then any
    /// identifiers of path entities stored as extra fields. When some path
    /// entity's ids are not stored, every extra field joins the key.
    pub fn identity_key_fields(&self) -> &[FieldId] {
        &self.identity_key_fields
    }

    /// Estimated size of one entry in bytes.
    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    /// Estimated size of the whole index in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Stable storage name derived from the index structure.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Human-readable `[hash][order][extra]` rendering.
    pub fn describe(&self, model: &Model) -> String {
        format!(
            "{} [{}][{}][{}]",
            self.key,
            join_names(model, self.hash_fields.iter()),
            join_names(model, self.order_fields.iter()),
            join_names(model, self.extra.iter())
        )
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn join_names<'a>(model: &Model, fields: impl Iterator<Item = &'a FieldId>) -> String {
    fields
        .map(|field| model.field_name(*field))
        .collect::<Vec<_>>()
        .join(", ")
}

fn sorted(fields: &[FieldId]) -> Vec<FieldId> {
    let mut fields = fields.to_vec();
    fields.sort();
    fields
}

/// FNV-1a over the field groups, separated so that moving a field between
/// groups changes the key.
fn structural_key(
    hash_fields: &FieldSet,
    order_fields: &[FieldId],
    extra: &FieldSet,
    path: &[FieldId],
) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    let groups: [Vec<FieldId>; 4] = [
        hash_fields.iter().copied().collect(),
        order_fields.to_vec(),
        extra.iter().copied().collect(),
        path.to_vec(),
    ];
    for group in groups {
        for field in group {
            for byte in field.as_u32().to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(PRIME);
            }
        }
        hash ^= 0xff;
        hash = hash.wrapping_mul(PRIME);
    }
    format!("i{:016x}", hash)
}
