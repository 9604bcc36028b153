//! In-memory backend.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{compare_rows, identity_key, project, row_matches, Backend, Row};
use crate::catalog::{FieldSet, Index};
use crate::error::{Error, Result};
use crate::statement::Condition;

/// Backend holding every index as a row list behind a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    indexes: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries stored in `index`.
    pub fn entry_count(&self, index: &Index) -> usize {
        self.indexes
            .read()
            .get(index.key())
            .map_or(0, |rows| rows.len())
    }

    fn missing(index: &Index) -> Error {
        Error::backend(format!("index {} does not exist", index.key()))
    }
}

impl Backend for MemoryBackend {
    fn fetch(&self, index: &Index, select: &FieldSet, conditions: &[Condition]) -> Result<Vec<Row>> {
        let indexes = self.indexes.read();
        let rows = indexes.get(index.key()).ok_or_else(|| Self::missing(index))?;
        let mut matched: Vec<&Row> = rows
            .iter()
            .filter(|row| row_matches(row, conditions))
            .collect();
        matched.sort_by(|a, b| compare_rows(a, b, index.order_fields()));
        let matched = matched.into_iter().map(|row| project(row, select)).collect();
        Ok(matched)
    }

    fn insert(&self, index: &Index, rows: &[Row]) -> Result<()> {
        let mut indexes = self.indexes.write();
        let stored = indexes
            .get_mut(index.key())
            .ok_or_else(|| Self::missing(index))?;
        for row in rows {
            let entry = project(row, index.all_fields());
            let key = identity_key(index, &entry)?;
            let existing = stored
                .iter()
                .position(|candidate| identity_key(index, candidate).is_ok_and(|k| k == key));
            match existing {
                Some(position) => stored[position] = entry,
                None => stored.push(entry),
            }
        }
        debug!(index = index.key(), rows = rows.len(), "inserted rows");
        Ok(())
    }

    fn delete(&self, index: &Index, rows: &[Row]) -> Result<()> {
        let mut indexes = self.indexes.write();
        let stored = indexes
            .get_mut(index.key())
            .ok_or_else(|| Self::missing(index))?;
        let keys = rows
            .iter()
            .map(|row| identity_key(index, row))
            .collect::<Result<Vec<_>>>()?;
        let before = stored.len();
        stored.retain(|candidate| match identity_key(index, candidate) {
            Ok(key) => !keys.contains(&key),
            Err(_) => true,
        });
        debug!(
            index = index.key(),
            removed = before - stored.len(),
            "deleted rows"
        );
        Ok(())
    }

    fn index_exists(&self, index: &Index) -> Result<bool> {
        Ok(self.indexes.read().contains_key(index.key()))
    }

    fn index_empty(&self, index: &Index) -> Result<bool> {
        Ok(self
            .indexes
            .read()
            .get(index.key())
            .map_or(true, |rows| rows.is_empty()))
    }

    fn create_index(&self, index: &Index) -> Result<()> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(index.key()) {
            return Err(Error::IndexAlreadyExists(index.key().to_string()));
        }
        indexes.insert(index.key().to_string(), Vec::new());
        Ok(())
    }

    fn drop_index(&self, index: &Index) -> Result<()> {
        self.indexes.write().remove(index.key());
        Ok(())
    }
}
