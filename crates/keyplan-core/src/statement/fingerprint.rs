//! Structural statement fingerprints used to register and find plans.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::condition::Conditions;
use super::query::Query;
use super::write::Write;
use super::Statement;

/// Fingerprint of a statement's shape.
///
/// Computed from the structure (path, fields, operators, ordering, limit),
/// never from literal values, so statements differing only in their bound
/// values share a plan.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StatementFingerprint {
    hash: u64,
}

impl StatementFingerprint {
    /// Fingerprint a query.
    pub fn from_query(query: &Query) -> Self {
        let mut hasher = DefaultHasher::new();
        0u8.hash(&mut hasher);

        query.key_path().fields().hash(&mut hasher);
        // Sets iterate in sorted order, so no canonicalization is needed
        query.select().hash(&mut hasher);
        Self::hash_conditions(query.conditions(), &mut hasher);
        query.order().hash(&mut hasher);
        // The limit is compiled into plans
        query.limit().hash(&mut hasher);

        Self {
            hash: hasher.finish(),
        }
    }

    /// Fingerprint a write.
    pub fn from_write(write: &Write) -> Self {
        let mut hasher = DefaultHasher::new();
        1u8.hash(&mut hasher);

        write.kind().hash(&mut hasher);
        write.entity().hash(&mut hasher);
        write.setting_fields().hash(&mut hasher);
        Self::hash_conditions(write.conditions(), &mut hasher);

        Self {
            hash: hasher.finish(),
        }
    }

    /// Fingerprint any statement.
    pub fn from_statement(statement: &Statement) -> Self {
        match statement {
            Statement::Query(query) => Self::from_query(query),
            Statement::Write(write) => Self::from_write(write),
        }
    }

    /// Raw hash value.
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    fn hash_conditions<H: Hasher>(conditions: &Conditions, hasher: &mut H) {
        conditions.len().hash(hasher);
        for condition in conditions.values() {
            condition.field.hash(hasher);
            condition.operator.hash(hasher);
        }
    }
}
