//! Parsed write statements.

use keyplan_proto::{Operator, Value};

use super::condition::{Condition, Conditions, FieldSetting};
use crate::catalog::{EntityId, FieldSet, Model};
use crate::error::{Error, Result};

/// Kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// An insert, update or delete against one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    kind: WriteKind,
    entity: EntityId,
    settings: Vec<FieldSetting>,
    conditions: Conditions,
}

impl Write {
    /// Validate and build a write.
    pub fn new(
        model: &Model,
        kind: WriteKind,
        entity: EntityId,
        settings: Vec<FieldSetting>,
        conditions: Conditions,
    ) -> Result<Self> {
        match kind {
            WriteKind::Insert if !conditions.is_empty() => {
                return Err(Error::InvalidStatement("insert takes no conditions".into()))
            }
            WriteKind::Delete if !settings.is_empty() => {
                return Err(Error::InvalidStatement("delete takes no settings".into()))
            }
            WriteKind::Insert | WriteKind::Update if settings.is_empty() => {
                return Err(Error::InvalidStatement(format!(
                    "{:?} sets no fields",
                    kind
                )))
            }
            _ => {}
        }

        let fields = settings
            .iter()
            .map(|s| s.field)
            .chain(conditions.keys().copied());
        for field in fields {
            if model.field(field).entity != entity {
                return Err(Error::InvalidStatement(format!(
                    "'{}' does not belong to '{}'",
                    model.field_name(field),
                    model.entity(entity).name
                )));
            }
        }

        Ok(Self {
            kind,
            entity,
            settings,
            conditions,
        })
    }

    /// Start building a write against the named entity.
    pub fn builder<'a>(model: &'a Model, kind: WriteKind, entity: &str) -> WriteBuilder<'a> {
        WriteBuilder::new(model, kind, entity)
    }

    pub fn kind(&self) -> WriteKind {
        self.kind
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn settings(&self) -> &[FieldSetting] {
        &self.settings
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Fields assigned by the write.
    pub fn setting_fields(&self) -> FieldSet {
        self.settings.iter().map(|s| s.field).collect()
    }

    /// Fields carrying an equality condition.
    pub fn eq_fields(&self) -> FieldSet {
        self.conditions
            .values()
            .filter(|c| !c.is_range())
            .map(|c| c.field)
            .collect()
    }

    /// Fields whose values the write itself supplies.
    pub fn given_fields(&self) -> FieldSet {
        let mut fields = self.setting_fields();
        fields.extend(self.eq_fields());
        fields
    }

    /// Whether existing index entries must be removed.
    pub fn requires_delete(&self) -> bool {
        matches!(self.kind, WriteKind::Update | WriteKind::Delete)
    }

    /// Whether new index entries must be written.
    pub fn requires_insert(&self) -> bool {
        matches!(self.kind, WriteKind::Insert | WriteKind::Update)
    }
}

/// Builder resolving qualified field names against a model.
pub struct WriteBuilder<'a> {
    model: &'a Model,
    kind: WriteKind,
    entity: Option<EntityId>,
    settings: Vec<FieldSetting>,
    conditions: Conditions,
    error: Option<Error>,
}

impl<'a> WriteBuilder<'a> {
    fn new(model: &'a Model, kind: WriteKind, entity: &str) -> Self {
        let (entity, error) = match model.entity_id(entity) {
            Ok(id) => (Some(id), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            model,
            kind,
            entity,
            settings: Vec::new(),
            conditions: Conditions::new(),
            error,
        }
    }

    fn record(&mut self, err: Error) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Assign a literal.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        match self.model.field_id(name) {
            Ok(field) => self.settings.push(FieldSetting::new(field, value)),
            Err(err) => self.record(err),
        }
        self
    }

    /// Assign a parameter bound at execution time.
    pub fn set_param(mut self, name: &str) -> Self {
        match self.model.field_id(name) {
            Ok(field) => self.settings.push(FieldSetting::param(field)),
            Err(err) => self.record(err),
        }
        self
    }

    /// Add an equality condition.
    pub fn eq(self, name: &str, value: impl Into<Value>) -> Self {
        self.condition(name, Operator::Eq, Some(value.into()))
    }

    /// Add a range condition.
    pub fn range(self, name: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.condition(name, operator, Some(value.into()))
    }

    /// Add an unbound condition.
    pub fn param(self, name: &str, operator: Operator) -> Self {
        self.condition(name, operator, None)
    }

    fn condition(mut self, name: &str, operator: Operator, value: Option<Value>) -> Self {
        match self.model.field_id(name) {
            Ok(field) => {
                self.conditions.insert(
                    field,
                    Condition {
                        field,
                        operator,
                        value,
                    },
                );
            }
            Err(err) => self.record(err),
        }
        self
    }

    pub fn build(self) -> Result<Write> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let entity = self
            .entity
            .ok_or_else(|| Error::InvalidStatement("write has no entity".into()))?;
        Write::new(self.model, self.kind, entity, self.settings, self.conditions)
    }
}
