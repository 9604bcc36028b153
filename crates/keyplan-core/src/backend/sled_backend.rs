//! Persistent backend storing each index in its own sled tree.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, info};

use super::codec::{encode_key, StoredRow};
use super::{identity_key, project, row_matches, Backend, Row};
use crate::catalog::{FieldSet, Index};
use crate::error::{Error, Result};
use crate::statement::Condition;

/// Tree name prefix for index entries.
pub const INDEX_TREE_PREFIX: &str = "index:";

/// Tree recording which indexes exist.
const CATALOG_TREE: &str = "catalog";

/// Configuration for the sled backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SledConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Temporary database (deleted on drop).
    pub temporary: bool,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Flush interval in milliseconds. None means flush on every write.
    pub flush_every_ms: Option<u64>,

    /// Enable zstd compression.
    pub compression: bool,
}

impl Default for SledConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./keyplan_data"),
            temporary: false,
            cache_capacity: 256 * 1024 * 1024, // 256MB
            flush_every_ms: Some(1000),
            compression: false,
        }
    }
}

impl SledConfig {
    /// Create a configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::new(),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the cache capacity.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set the flush interval.
    pub fn with_flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Enable or disable compression.
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression)
            .flush_every_ms(self.flush_every_ms);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        config
    }
}

/// Backend keeping one sled tree per index.
///
/// Key format: order-preserving encoding of the index's identity key
/// fields, hash fields first, so entries sharing a hash key are contiguous
/// and iterate in clustering order.
/// Value format: rkyv-encoded [`StoredRow`].
pub struct SledBackend {
    db: Db,
    catalog: Tree,
}

impl SledBackend {
    /// Open or create a sled database.
    pub fn open(config: SledConfig) -> Result<Self> {
        let db = config.to_sled_config().open()?;
        let catalog = db.open_tree(CATALOG_TREE)?;
        info!(path = %config.path.display(), temporary = config.temporary, "opened sled backend");
        Ok(Self { db, catalog })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, index: &Index) -> Result<Tree> {
        if !self.catalog.contains_key(index.key())? {
            return Err(Error::backend(format!("index {} does not exist", index.key())));
        }
        Ok(self.db.open_tree(Self::tree_name(index))?)
    }

    fn tree_name(index: &Index) -> String {
        format!("{}{}", INDEX_TREE_PREFIX, index.key())
    }

    fn entry_key(index: &Index, row: &Row) -> Result<Vec<u8>> {
        Ok(encode_key(identity_key(index, row)?))
    }

    /// Key prefix covering every entry with the hash values the conditions fix.
    fn hash_prefix(index: &Index, conditions: &[Condition]) -> Option<Vec<u8>> {
        let values = index
            .hash_fields()
            .iter()
            .map(|field| {
                conditions
                    .iter()
                    .find(|c| c.field == *field && !c.is_range())
                    .and_then(|c| c.value.as_ref())
            })
            .collect::<Option<Vec<_>>>()?;
        Some(encode_key(values))
    }
}

impl Backend for SledBackend {
    fn fetch(&self, index: &Index, select: &FieldSet, conditions: &[Condition]) -> Result<Vec<Row>> {
        let tree = self.tree(index)?;
        let entries = match Self::hash_prefix(index, conditions) {
            Some(prefix) => tree.scan_prefix(prefix),
            None => tree.iter(),
        };

        let mut rows = Vec::new();
        for entry in entries {
            let (_, bytes) = entry?;
            let row = StoredRow::from_bytes(&bytes)?.into_row();
            if row_matches(&row, conditions) {
                rows.push(project(&row, select));
            }
        }
        Ok(rows)
    }

    fn insert(&self, index: &Index, rows: &[Row]) -> Result<()> {
        let tree = self.tree(index)?;
        let mut batch = sled::Batch::default();
        for row in rows {
            let entry = project(row, index.all_fields());
            batch.insert(Self::entry_key(index, &entry)?, StoredRow::from_row(&entry).to_bytes()?);
        }
        tree.apply_batch(batch)?;
        debug!(index = index.key(), rows = rows.len(), "inserted rows");
        Ok(())
    }

    fn delete(&self, index: &Index, rows: &[Row]) -> Result<()> {
        let tree = self.tree(index)?;
        let mut batch = sled::Batch::default();
        for row in rows {
            batch.remove(Self::entry_key(index, row)?);
        }
        tree.apply_batch(batch)?;
        debug!(index = index.key(), rows = rows.len(), "deleted rows");
        Ok(())
    }

    fn index_exists(&self, index: &Index) -> Result<bool> {
        Ok(self.catalog.contains_key(index.key())?)
    }

    fn index_empty(&self, index: &Index) -> Result<bool> {
        if !self.index_exists(index)? {
            return Ok(true);
        }
        Ok(self.tree(index)?.is_empty())
    }

    fn create_index(&self, index: &Index) -> Result<()> {
        if self.index_exists(index)? {
            return Err(Error::IndexAlreadyExists(index.key().to_string()));
        }
        self.db.open_tree(Self::tree_name(index))?;
        self.catalog.insert(index.key(), index.entry_size().to_le_bytes().to_vec())?;
        info!(index = index.key(), "created index");
        Ok(())
    }

    fn drop_index(&self, index: &Index) -> Result<()> {
        self.db.drop_tree(Self::tree_name(index))?;
        self.catalog.remove(index.key())?;
        info!(index = index.key(), "dropped index");
        Ok(())
    }
}
