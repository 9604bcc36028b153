//! Conditions and settings attached to statements.

use std::collections::BTreeMap;

use keyplan_proto::{Operator, Value};

use crate::catalog::FieldId;

/// A comparison of a field against a literal.
///
/// A condition without a value is a parameter; it must be bound before the
/// statement executes.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: FieldId,
    pub operator: Operator,
    pub value: Option<Value>,
}

impl Condition {
    pub fn new(field: FieldId, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field,
            operator,
            value: Some(value.into()),
        }
    }

    /// Equality condition.
    pub fn eq(field: FieldId, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    /// Unbound condition.
    pub fn param(field: FieldId, operator: Operator) -> Self {
        Self {
            field,
            operator,
            value: None,
        }
    }

    pub fn is_range(&self) -> bool {
        self.operator.is_range()
    }

    /// Whether a stored value satisfies the condition. Unbound conditions match nothing.
    pub fn matches(&self, stored: &Value) -> bool {
        self.value
            .as_ref()
            .is_some_and(|literal| self.operator.evaluate(stored, literal))
    }
}

/// Conditions keyed by field; at most one per field.
pub type Conditions = BTreeMap<FieldId, Condition>;

/// Collect conditions into a field-keyed map. Later conditions on the same field win.
pub fn conditions(items: impl IntoIterator<Item = Condition>) -> Conditions {
    items.into_iter().map(|c| (c.field, c)).collect()
}

/// A `field = value` assignment of a write.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSetting {
    pub field: FieldId,
    /// `None` for a parameter bound at execution time.
    pub value: Option<Value>,
}

impl FieldSetting {
    pub fn new(field: FieldId, value: impl Into<Value>) -> Self {
        Self {
            field,
            value: Some(value.into()),
        }
    }

    pub fn param(field: FieldId) -> Self {
        Self { field, value: None }
    }
}
