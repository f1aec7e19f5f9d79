//! Multi-dialect SQL data-access core: driver abstraction, transactional
//! connection pool, structured SQL-error pipeline, dynamically-composable
//! query builder, and an Eloquent-style ORM layer on top of compile-time
//! schema reflection.
//!
//! `quill-derive`'s `#[derive(Model)]` implements [`schema::Schema`] and
//! [`model::ModelAccessor`] for a user record type; this crate is usable
//! without it for callers that implement those traits by hand.

#![allow(async_fn_in_trait)]

// Re-exported so `quill-derive`'s generated code can reference chrono types
// without requiring every downstream crate to also depend on it directly.
pub use chrono;

pub mod config;
pub mod database;
pub mod driver;
pub mod dynamic;
pub mod error;
pub mod model;
pub mod pool;
pub mod query;
pub mod relations;
pub mod schema;
pub mod transaction;
pub mod value;

pub use database::Database;
pub use driver::{Connection, DriverKind, ResultSet, Row};
pub use error::{ErrorKind, SqlError, SqlResult};
pub use model::{ModelAccessor, ModelList, ModelQuery, ModelQueryImplicit};
pub use pool::{Lease, Pool, PoolStats};
pub use query::QueryBuilder;
pub use schema::{ColumnInfo, ColumnType, Migrator, Schema, TableSchema};
pub use transaction::Transaction;
pub use value::Value;

/// A loosely typed JSON-like object, used for dynamic-model payloads that
/// don't carry a generated `Schema` (spec.md §4.9).
pub type Map = std::collections::HashMap<String, Value>;
