//! keyplan protocol types.
//!
//! This crate defines the value-level types that cross the boundary between the
//! keyplan execution pipeline and a storage backend.
//!
//! # Modules
//!
//! - [`value`] - Runtime values stored in index rows and bound to conditions
//! - [`operator`] - Comparison operators used by equality and range conditions
//!
//! # Serialization
//!
//! Types derive `rkyv::Archive`, `rkyv::Serialize` and `rkyv::Deserialize` for
//! storage, and serde's traits for configuration and fixtures.

pub mod operator;
pub mod value;

pub use operator::Operator;
pub use value::Value;
