//! Storage backends that execution steps delegate to.
//!
//! [`Backend`] is the capability table: fetch, insert and delete against
//! indexes, index setup and teardown, plus in-memory filter, sort and limit
//! that a backend may override.

pub mod codec;
pub mod memory;
pub mod sled_backend;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use keyplan_proto::Value;

use crate::catalog::{FieldId, FieldSet, Index};
use crate::error::{Error, Result};
use crate::statement::Condition;

pub use self::memory::MemoryBackend;
pub use self::sled_backend::{SledBackend, SledConfig};

/// One row flowing through a pipeline, keyed by field.
pub type Row = BTreeMap<FieldId, Value>;

/// Operations a storage system provides to execution steps.
pub trait Backend: Send + Sync {
    /// Rows of `index` satisfying every condition, projected to `select`,
    /// in the index's clustering order.
    fn fetch(&self, index: &Index, select: &FieldSet, conditions: &[Condition]) -> Result<Vec<Row>>;

    /// Write rows into `index`, replacing entries with the same key.
    fn insert(&self, index: &Index, rows: &[Row]) -> Result<()>;

    /// Remove the entries of `index` identified by each row's key fields.
    fn delete(&self, index: &Index, rows: &[Row]) -> Result<()>;

    fn index_exists(&self, index: &Index) -> Result<bool>;

    fn index_empty(&self, index: &Index) -> Result<bool>;

    /// Create storage for `index`; fails with `IndexAlreadyExists` if present.
    fn create_index(&self, index: &Index) -> Result<()>;

    /// Remove `index` and its entries. Dropping a missing index is a no-op.
    fn drop_index(&self, index: &Index) -> Result<()>;

    /// One fetch per condition group; results line up with the groups.
    fn fetch_batch(
        &self,
        index: &Index,
        select: &FieldSet,
        condition_groups: &[Vec<Condition>],
    ) -> Result<Vec<Vec<Row>>> {
        condition_groups
            .iter()
            .map(|conditions| self.fetch(index, select, conditions))
            .collect()
    }

    /// Keep rows satisfying every condition.
    fn filter(&self, mut rows: Vec<Row>, conditions: &[Condition]) -> Vec<Row> {
        rows.retain(|row| row_matches(row, conditions));
        rows
    }

    /// Stable ascending sort on `fields`, lexicographic across the tuple.
    fn sort(&self, mut rows: Vec<Row>, fields: &[FieldId]) -> Vec<Row> {
        rows.sort_by(|a, b| compare_rows(a, b, fields));
        rows
    }

    /// Keep the first `limit` rows.
    fn limit(&self, mut rows: Vec<Row>, limit: usize) -> Vec<Row> {
        rows.truncate(limit);
        rows
    }
}

/// Whether a row satisfies every condition. Missing fields never match.
pub fn row_matches(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| {
        row.get(&condition.field)
            .is_some_and(|value| condition.matches(value))
    })
}

/// Lexicographic comparison on `fields`; missing values sort first.
pub fn compare_rows(a: &Row, b: &Row, fields: &[FieldId]) -> Ordering {
    for field in fields {
        let ordering = match (a.get(field), b.get(field)) {
            (Some(x), Some(y)) => x.sort_cmp(y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Restrict a row to `select`.
pub fn project(row: &Row, select: &FieldSet) -> Row {
    row.iter()
        .filter(|(field, _)| select.contains(field))
        .map(|(field, value)| (*field, value.clone()))
        .collect()
}

/// Values of `index`'s identity key fields in a row.
pub(crate) fn identity_key<'r>(index: &Index, row: &'r Row) -> Result<Vec<&'r Value>> {
    index
        .identity_key_fields()
        .iter()
        .map(|field| {
            row.get(field).ok_or_else(|| {
                Error::InvalidStatement(format!(
                    "row for index {} lacks key field {}",
                    index.key(),
                    field
                ))
            })
        })
        .collect()
}
