//! keyplan core - plan-step admission, statement compilation and execution.
//!
//! Given a data model of entities, fields and foreign-key paths, and a set of
//! materialized indexes, this crate decides whether an index can serve as the
//! next hop of an access plan for a statement, and lowers accepted plans into
//! pipelines that a storage backend runs.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exec;
pub mod plan;
pub mod statement;

pub use backend::{Backend, MemoryBackend, Row, SledBackend, SledConfig};
pub use catalog::{
    EntityDef, EntityId, EntityPath, FieldDef, FieldId, FieldKind, FieldSet, Index, KeyPath,
    Model, ModelBuilder, Relationship, ScalarType,
};
pub use config::{ExecutionConfig, PlannerConfig};
pub use error::{Error, Result};
pub use exec::{
    PlanRegistry, PreparedQuery, PreparedStatement, PreparedUpdate, StatementCompiler,
    StatementRunner, StatementStep, SupportStrategy,
};
pub use plan::{
    CostModel, IndexLookup, Planner, PlanStep, QueryPlan, QueryState, StepId, StepKind,
    UpdatePlan, UpdatePlanner,
};
pub use statement::{
    Condition, Conditions, FieldSetting, Query, QueryBuilder, Statement, StatementFingerprint,
    Write, WriteKind,
};

/// Re-export protocol types.
pub use keyplan_proto as proto;
