//! Statement execution.
//!
//! Accepted plans are compiled into [`StatementStep`] pipelines that run
//! against a [`Backend`](crate::backend::Backend). Queries become
//! [`PreparedQuery`]s; writes become one [`PreparedUpdate`] per affected
//! index, which reads existing entries through support queries before
//! deleting and reinserting them.

mod compiler;
mod prepared;
mod registry;
mod runner;
mod step;
mod update;

pub use compiler::StatementCompiler;
pub use prepared::PreparedQuery;
pub use registry::PlanRegistry;
pub use runner::{PreparedStatement, StatementRunner};
pub use step::{
    DeleteStep, FilterStep, InsertStep, LimitStep, LookupStep, SortStep, StatementStep,
};
pub use update::{PreparedUpdate, SupportStrategy, UpdateRows};
