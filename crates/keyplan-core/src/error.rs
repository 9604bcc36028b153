//! Core error types.

use thiserror::Error;

/// Opaque error raised by a storage backend.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core errors.
///
/// Admission rejections are not errors: `IndexLookup::admit` returns `None`.
#[derive(Debug, Error)]
pub enum Error {
    /// No sequence of admissible steps answers the statement.
    #[error("no plan found for statement: {0}")]
    NoPlanFound(String),

    /// A statement was submitted for execution without a registered plan.
    #[error("no prepared plan for statement: {0}")]
    PlanNotFound(String),

    /// A backend was asked to create an index it already holds.
    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    /// Backend-defined failure, propagated unchanged.
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),

    /// Storage layer error from the sled backend.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The data model or an index definition is inconsistent.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A statement is malformed or cannot be executed as given.
    #[error("invalid statement: {0}")]
    InvalidStatement(String),
}

impl Error {
    /// Wrap an arbitrary backend failure.
    pub fn backend(err: impl Into<BackendError>) -> Self {
        Error::Backend(err.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
