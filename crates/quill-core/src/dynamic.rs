//! Dynamic CRUD over untyped tables (spec.md §4.9): schema discovery via
//! each dialect's information-schema views, an explicit allow-list, and a
//! `DynamicModel` row represented as a `string -> Value` map.

use crate::driver::{Connection, DriverKind};
use crate::error::{ErrorKind, SqlError, SqlResult};
use crate::pool::Pool;
use crate::query::QueryBuilder;
use crate::value::Value;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

/// One discovered column's name and declared type string, exactly as the
/// dialect's information-schema view reports it (spec.md §4.9).
#[derive(Debug, Clone)]
pub struct DynamicColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// A row from a dynamically discovered table: an ordered column list plus
/// an untyped name→value map (spec.md §4.9, `DynamicModel`).
#[derive(Debug, Clone, Default)]
pub struct DynamicModel {
    pub values: HashMap<String, Value>,
}

impl DynamicModel {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }
}

type SchemaCache = RwLock<AHashMap<String, Vec<DynamicColumn>>>;

/// Discovers and allow-lists tables at runtime, backing `quill`'s dynamic
/// CRUD surface. A fresh `DynamicCatalog` starts with an empty allow-list —
/// every table must be named explicitly via [`DynamicCatalog::allow`]
/// before [`DynamicCatalog::discover_schema`] will touch it (spec.md §4.9,
/// "tables must be explicitly allow-listed").
pub struct DynamicCatalog {
    allowed: RwLock<ahash::AHashSet<String>>,
    cache: SchemaCache,
}

impl Default for DynamicCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicCatalog {
    pub fn new() -> Self {
        Self {
            allowed: RwLock::new(ahash::AHashSet::default()),
            cache: RwLock::new(AHashMap::new()),
        }
    }

    pub fn allow(&self, table: impl Into<String>) {
        self.allowed.write().insert(table.into());
    }

    pub fn is_allowed(&self, table: &str) -> bool {
        self.allowed.read().contains(table)
    }

    fn require_allowed(&self, table: &str) -> SqlResult<()> {
        if self.is_allowed(table) {
            Ok(())
        } else {
            Err(SqlError::new(ErrorKind::TableNotAllowed, format!("table `{table}` is not allow-listed")).with_table(table))
        }
    }

    /// Queries the dialect's information-schema view for `table`'s columns,
    /// caching the result so repeated discovery is O(1) after the first
    /// call (spec.md §4.9).
    pub async fn discover_schema<C: Connection + 'static>(
        &self,
        pool: &Pool<C>,
        table: &str,
    ) -> SqlResult<Vec<DynamicColumn>> {
        self.require_allowed(table)?;
        if let Some(cached) = self.cache.read().get(table) {
            return Ok(cached.clone());
        }

        let lease = pool.acquire().await?;
        let dialect = lease.driver_kind();
        let sql = information_schema_query(dialect, table);
        let mut result = lease.query(&sql).await?;
        let rows = result.take_rows();
        // information_schema.columns orders (name, type, nullable); SQLite's
        // `PRAGMA table_info` instead reports (cid, name, type, notnull, ...).
        let columns: Vec<DynamicColumn> = rows
            .iter()
            .filter_map(|row| match dialect {
                DriverKind::Sqlite | DriverKind::Memory => {
                    let name = row.get(1)?.to_string();
                    let data_type = row.get(2).unwrap_or("unknown").to_string();
                    let nullable = row.get(3).map(|v| v != "1").unwrap_or(true);
                    Some(DynamicColumn { name, data_type, nullable })
                }
                DriverKind::MySql | DriverKind::Postgres => {
                    let name = row.get(0)?.to_string();
                    let data_type = row.get(1).unwrap_or("unknown").to_string();
                    let nullable = row.get(2).map(|v| v.eq_ignore_ascii_case("yes")).unwrap_or(true);
                    Some(DynamicColumn { name, data_type, nullable })
                }
            })
            .collect();

        self.cache.write().insert(table.to_string(), columns.clone());
        Ok(columns)
    }

    pub async fn select<C: Connection + 'static>(
        &self,
        pool: &Pool<C>,
        table: &str,
        query: QueryBuilder,
    ) -> SqlResult<Vec<DynamicModel>> {
        self.require_allowed(table)?;
        let lease = pool.acquire().await?;
        let mut result = lease.query(&query.to_sql()).await?;
        let fields = result.fields().to_vec();
        let rows = result.take_rows();
        Ok(rows
            .iter()
            .map(|row| {
                let mut values = HashMap::with_capacity(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    let value = match row.get(i) {
                        Some(cell) => Value::Text(cell.to_string()),
                        None => Value::Null,
                    };
                    values.insert(field.clone(), value);
                }
                DynamicModel { values }
            })
            .collect())
    }

    pub async fn insert<C: Connection + 'static>(
        &self,
        pool: &Pool<C>,
        table: &str,
        values: &HashMap<String, Value>,
    ) -> SqlResult<u64> {
        self.require_allowed(table)?;
        let lease = pool.acquire().await?;
        let dialect = lease.driver_kind();
        let (fields, rendered) = render_value_map(values, dialect);
        let sql = format!("INSERT INTO {table} ({}) VALUES ({})", fields.join(", "), rendered.join(", "));
        lease.exec(&sql).await
    }

    pub async fn update<C: Connection + 'static>(
        &self,
        pool: &Pool<C>,
        table: &str,
        query: &QueryBuilder,
        values: &HashMap<String, Value>,
    ) -> SqlResult<u64> {
        self.require_allowed(table)?;
        let lease = pool.acquire().await?;
        let dialect = lease.driver_kind();
        let assignments: Vec<String> = values.iter().map(|(f, v)| format!("{f} = {}", v.render_literal(dialect))).collect();
        let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
        if let Some(where_clause) = query.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        lease.exec(&sql).await
    }

    pub async fn delete<C: Connection + 'static>(&self, pool: &Pool<C>, table: &str, query: &QueryBuilder) -> SqlResult<u64> {
        self.require_allowed(table)?;
        let lease = pool.acquire().await?;
        let mut sql = format!("DELETE FROM {table}");
        if let Some(where_clause) = query.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        lease.exec(&sql).await
    }
}

fn render_value_map(values: &HashMap<String, Value>, dialect: DriverKind) -> (Vec<&str>, Vec<String>) {
    let fields: Vec<&str> = values.keys().map(|k| k.as_str()).collect();
    let rendered: Vec<String> = fields.iter().map(|f| values[*f].render_literal(dialect)).collect();
    (fields, rendered)
}

fn information_schema_query(dialect: DriverKind, table: &str) -> String {
    match dialect {
        DriverKind::MySql => format!(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_name = '{table}' ORDER BY ordinal_position"
        ),
        DriverKind::Postgres => format!(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_name = '{table}' ORDER BY ordinal_position"
        ),
        DriverKind::Sqlite | DriverKind::Memory => format!("PRAGMA table_info({table})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tables_outside_the_allow_list() {
        let catalog = DynamicCatalog::new();
        assert!(catalog.require_allowed("secrets").is_err());
        catalog.allow("secrets");
        assert!(catalog.require_allowed("secrets").is_ok());
    }

    #[test]
    fn mysql_and_postgres_share_the_information_schema_query_shape() {
        let mysql = information_schema_query(DriverKind::MySql, "users");
        let postgres = information_schema_query(DriverKind::Postgres, "users");
        assert!(mysql.contains("information_schema.columns"));
        assert!(postgres.contains("information_schema.columns"));
    }

    #[test]
    fn sqlite_uses_pragma_table_info() {
        let sql = information_schema_query(DriverKind::Sqlite, "users");
        assert_eq!(sql, "PRAGMA table_info(users)");
    }
}
