//! Uniform driver abstraction over SQLite, MySQL, PostgreSQL, and an
//! in-memory test driver (spec.md §4.1).

pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::error::SqlResult;
use std::collections::HashMap;

/// Which dialect a connection or query is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Sqlite,
    MySql,
    Postgres,
    Memory,
}

impl DriverKind {
    /// The `AUTO_INCREMENT`-equivalent DDL clause for a primary key integer
    /// column in this dialect.
    pub fn auto_increment_clause(self) -> &'static str {
        match self {
            DriverKind::MySql => "AUTO_INCREMENT",
            DriverKind::Postgres => "", // spelled via SERIAL/BIGSERIAL column type instead
            DriverKind::Sqlite => "AUTOINCREMENT",
            DriverKind::Memory => "",
        }
    }

    /// The dialect's `RANDOM()`-equivalent function name.
    pub fn random_function(self) -> &'static str {
        match self {
            DriverKind::MySql => "RAND()",
            DriverKind::Postgres => "RANDOM()",
            DriverKind::Sqlite | DriverKind::Memory => "ABS(RANDOM())",
        }
    }

    /// The boolean literal rendering used for DDL defaults in this dialect.
    pub fn bool_literal(self, value: bool) -> &'static str {
        match self {
            DriverKind::Postgres => {
                if value {
                    "TRUE"
                } else {
                    "FALSE"
                }
            }
            _ => {
                if value {
                    "1"
                } else {
                    "0"
                }
            }
        }
    }
}

/// A single row: an ordered sequence of optional textual cells aligned with
/// a [`ResultSet`]'s field-name list. Typed conversion happens in the
/// mapping layer, not here (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct Row {
    cells: Vec<Option<String>>,
}

impl Row {
    pub fn new(cells: Vec<Option<String>>) -> Self {
        Self { cells }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.cells.get(index).and_then(|c| c.as_deref())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Field-name list, in column order, plus materialized rows and a row
/// count. A ResultSet has exactly one consumer: [`ResultSet::take_rows`]
/// may only be called once, matching the "restartable: no" invariant in
/// spec.md §3.
#[derive(Debug)]
pub struct ResultSet {
    fields: Vec<String>,
    rows: Vec<Row>,
    consumed: bool,
}

impl ResultSet {
    pub fn new(fields: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            fields,
            rows,
            consumed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Builds a fields→column-index cache in a single O(F·C) scan, so that
    /// mapping every row into a model record is O(F) rather than the
    /// quadratic per-row lookup a naive implementation would incur
    /// (spec.md §4.5, "Key algorithmic detail").
    pub fn field_index_map(&self) -> HashMap<&str, usize> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.as_str(), i))
            .collect()
    }

    /// Takes ownership of the materialized rows. Panics if called twice.
    pub fn take_rows(&mut self) -> Vec<Row> {
        assert!(!self.consumed, "ResultSet already consumed (single forward pass)");
        self.consumed = true;
        std::mem::take(&mut self.rows)
    }
}

/// The capability set every dialect driver exposes (spec.md §4.1).
///
/// Native `async fn` in traits, not boxed via `async-trait`.
pub trait Connection: Send {
    /// Executes a statement with no result rows, returning rows affected.
    async fn exec(&mut self, sql: &str) -> SqlResult<u64>;

    /// Executes a statement and materializes its result set.
    async fn query(&mut self, sql: &str) -> SqlResult<ResultSet>;

    async fn begin_transaction(&mut self) -> SqlResult<()>;
    async fn commit(&mut self) -> SqlResult<()>;
    async fn rollback(&mut self) -> SqlResult<()>;

    /// The row id generated by the most recent `INSERT`, if the dialect
    /// exposes one directly on the connection.
    fn last_insert_id(&self) -> Option<i64>;

    fn driver_kind(&self) -> DriverKind;

    /// A trivial health probe used by the pool's keep-alive loop.
    async fn ping(&mut self) -> SqlResult<()>;
}
