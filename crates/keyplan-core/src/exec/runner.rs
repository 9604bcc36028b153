//! Running statements through their registered plans.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, instrument};

use super::prepared::PreparedQuery;
use super::registry::PlanRegistry;
use super::update::PreparedUpdate;
use crate::backend::{Backend, Row};
use crate::catalog::{Index, Model};
use crate::config::ExecutionConfig;
use crate::error::{Error, Result};
use crate::statement::{
    Conditions, FieldSetting, Query, Statement, StatementFingerprint, Write,
};

/// A statement compiled and ready to execute.
#[derive(Debug, Clone)]
pub enum PreparedStatement {
    Query(Arc<PreparedQuery>),
    /// One prepared update per affected index.
    Update(Arc<Vec<PreparedUpdate>>),
}

/// Executes statements against a backend using plans from a registry.
///
/// Compiled statements are cached by fingerprint, so statements differing
/// only in their values compile once.
pub struct StatementRunner<'m, B: Backend> {
    model: &'m Model,
    backend: B,
    registry: Arc<PlanRegistry>,
    config: ExecutionConfig,
    queries: DashMap<StatementFingerprint, Arc<PreparedQuery>>,
    updates: DashMap<StatementFingerprint, Arc<Vec<PreparedUpdate>>>,
}

impl<'m, B: Backend> StatementRunner<'m, B> {
    pub fn new(model: &'m Model, backend: B, registry: Arc<PlanRegistry>) -> Self {
        Self::with_config(model, backend, registry, ExecutionConfig::default())
    }

    pub fn with_config(
        model: &'m Model,
        backend: B,
        registry: Arc<PlanRegistry>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            model,
            backend,
            registry,
            config,
            queries: DashMap::new(),
            updates: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<PlanRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Compile the registered plan for `query`.
    pub fn prepare_query(&self, query: &Query) -> Result<Arc<PreparedQuery>> {
        let fingerprint = StatementFingerprint::from_query(query);
        if let Some(prepared) = self.queries.get(&fingerprint) {
            return Ok(Arc::clone(prepared.value()));
        }

        let plan = self
            .registry
            .query_plan(query)
            .ok_or_else(|| Error::PlanNotFound(describe_query(self.model, query)))?;
        let prepared = Arc::new(PreparedQuery::new(&plan)?);
        self.queries.insert(fingerprint, Arc::clone(&prepared));
        Ok(prepared)
    }

    /// Compile the registered update plans for `write`.
    pub fn prepare_update(&self, write: &Write) -> Result<Arc<Vec<PreparedUpdate>>> {
        let fingerprint = StatementFingerprint::from_write(write);
        if let Some(prepared) = self.updates.get(&fingerprint) {
            return Ok(Arc::clone(prepared.value()));
        }

        let plans = self.registry.update_plans(write).ok_or_else(|| {
            Error::PlanNotFound(format!(
                "{:?} on {}",
                write.kind(),
                self.model.entity(write.entity()).name
            ))
        })?;
        let prepared = plans
            .iter()
            .map(|plan| PreparedUpdate::new(self.model, plan, self.config.clone()))
            .collect::<Result<Vec<_>>>()?;
        let prepared = Arc::new(prepared);
        self.updates.insert(fingerprint, Arc::clone(&prepared));
        Ok(prepared)
    }

    pub fn prepare(&self, statement: &Statement) -> Result<PreparedStatement> {
        match statement {
            Statement::Query(query) => self.prepare_query(query).map(PreparedStatement::Query),
            Statement::Write(write) => self.prepare_update(write).map(PreparedStatement::Update),
        }
    }

    /// Run `query`; `conditions` bind its parameters and override its literals.
    #[instrument(skip_all)]
    pub fn query(&self, query: &Query, conditions: &Conditions) -> Result<Vec<Row>> {
        let prepared = self.prepare_query(query)?;
        let conditions = merge_conditions(query.conditions(), conditions);
        prepared.execute(&self.backend, &conditions)
    }

    /// Apply `write` to every index it affects.
    ///
    /// `settings` and `conditions` bind parameters and override literals.
    /// Existing entries are read for every index before any index changes.
    #[instrument(skip_all)]
    pub fn update(
        &self,
        write: &Write,
        settings: &[FieldSetting],
        conditions: &Conditions,
    ) -> Result<()> {
        let prepared = self.prepare_update(write)?;
        let settings = merge_settings(write.settings(), settings);
        let conditions = merge_conditions(write.conditions(), conditions);
        let resolved = prepared
            .iter()
            .map(|update| update.resolve(&self.backend, &settings, &conditions))
            .collect::<Result<Vec<_>>>()?;
        for (update, rows) in prepared.iter().zip(resolved) {
            update.apply(&self.backend, &settings, rows)?;
        }
        debug!(indexes = prepared.len(), "applied write");
        Ok(())
    }

    /// Run a statement with its own literal values. Writes return no rows.
    pub fn execute(&self, statement: &Statement) -> Result<Vec<Row>> {
        match statement {
            Statement::Query(query) => self.query(query, &Conditions::new()),
            Statement::Write(write) => {
                self.update(write, &[], &Conditions::new())?;
                Ok(Vec::new())
            }
        }
    }

    /// Create storage for `indexes`, returning how many were created.
    ///
    /// Existing indexes are dropped and recreated with `drop_existing`,
    /// left alone with `skip_existing`, and otherwise an error.
    #[instrument(skip(self, indexes))]
    pub fn create_indexes<'i>(
        &self,
        indexes: impl IntoIterator<Item = &'i Index>,
        skip_existing: bool,
        drop_existing: bool,
    ) -> Result<usize> {
        let mut created = 0;
        for index in indexes {
            if self.backend.index_exists(index)? {
                if drop_existing {
                    self.backend.drop_index(index)?;
                } else if skip_existing {
                    continue;
                } else {
                    return Err(Error::IndexAlreadyExists(index.key().to_string()));
                }
            }
            self.backend.create_index(index)?;
            created += 1;
        }
        info!(created, "created indexes");
        Ok(created)
    }

    /// Drop `indexes` and everything stored in them.
    pub fn drop_indexes<'i>(&self, indexes: impl IntoIterator<Item = &'i Index>) -> Result<usize> {
        let mut dropped = 0;
        for index in indexes {
            if self.backend.index_exists(index)? {
                self.backend.drop_index(index)?;
                dropped += 1;
            }
        }
        Ok(dropped)
    }
}

fn merge_conditions(own: &Conditions, given: &Conditions) -> Conditions {
    let mut merged = own.clone();
    merged.extend(given.iter().map(|(field, c)| (*field, c.clone())));
    merged
}

fn merge_settings(own: &[FieldSetting], given: &[FieldSetting]) -> Vec<FieldSetting> {
    let mut merged: Vec<FieldSetting> = own
        .iter()
        .filter(|setting| !given.iter().any(|g| g.field == setting.field))
        .cloned()
        .collect();
    merged.extend(given.iter().cloned());
    merged
}

fn describe_query(model: &Model, query: &Query) -> String {
    let select: Vec<String> = query.select().iter().map(|f| model.field_name(*f)).collect();
    format!(
        "SELECT {} FROM {}",
        select.join(", "),
        model.entity(query.entity()).name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::catalog::{EntityDef, FieldDef, ScalarType};

    fn model() -> Model {
        Model::builder()
            .with_entity(
                EntityDef::new("User")
                    .with_count(10)
                    .with_field(FieldDef::id("id"))
                    .with_field(FieldDef::new("name", ScalarType::string())),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_merge_settings_prefers_given() {
        let field = crate::catalog::FieldId::from_u32(1);
        let merged = merge_settings(
            &[FieldSetting::param(field)],
            &[FieldSetting::new(field, "bound")],
        );
        assert_eq!(merged, vec![FieldSetting::new(field, "bound")]);
    }

    #[test]
    fn test_create_indexes_flags() {
        let model = model();
        let user = model.entity_id("User").unwrap();
        let identity = Index::identity_of(&model, user).unwrap();
        let runner = StatementRunner::new(&model, MemoryBackend::new(), Arc::new(PlanRegistry::new()));

        assert_eq!(runner.create_indexes([&identity], false, false).unwrap(), 1);
        assert!(matches!(
            runner.create_indexes([&identity], false, false),
            Err(Error::IndexAlreadyExists(_))
        ));
        assert_eq!(runner.create_indexes([&identity], true, false).unwrap(), 0);
        assert_eq!(runner.create_indexes([&identity], false, true).unwrap(), 1);
        assert_eq!(runner.drop_indexes([&identity]).unwrap(), 1);
        assert!(!runner.backend().index_exists(&identity).unwrap());
    }

    #[test]
    fn test_unregistered_query() {
        let model = model();
        let runner = StatementRunner::new(&model, MemoryBackend::new(), Arc::new(PlanRegistry::new()));
        let query = Query::builder(&model, model.key_path("User", &[]).unwrap())
            .select("User.name")
            .eq("User.id", 1)
            .build()
            .unwrap();
        assert!(matches!(
            runner.query(&query, &Conditions::new()),
            Err(Error::PlanNotFound(_))
        ));
    }
}
