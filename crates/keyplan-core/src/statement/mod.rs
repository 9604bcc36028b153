//! Already-parsed statements: queries and writes.

pub mod condition;
pub mod fingerprint;
pub mod query;
pub mod write;

pub use condition::{conditions, Condition, Conditions, FieldSetting};
pub use fingerprint::StatementFingerprint;
pub use query::{Query, QueryBuilder};
pub use write::{Write, WriteBuilder, WriteKind};

/// A statement submitted for planning or execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(Query),
    Write(Write),
}

impl Statement {
    pub fn fingerprint(&self) -> StatementFingerprint {
        StatementFingerprint::from_statement(self)
    }
}

impl From<Query> for Statement {
    fn from(query: Query) -> Self {
        Statement::Query(query)
    }
}

impl From<Write> for Statement {
    fn from(write: Write) -> Self {
        Statement::Write(write)
    }
}
