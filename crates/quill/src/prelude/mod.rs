//! Glob-importable surface for application code: `use quill::prelude::*;`
//! pulls in the driver, model, and error types most call sites need.

pub use quill_core::{
    Connection, DriverKind, ErrorKind, Lease, Map, ModelAccessor, ModelList, ModelQuery,
    ModelQueryImplicit, PoolStats, Row, Schema, Transaction,
};
pub use quill_derive::Model;
