//! Schema reflection and DDL emission (spec.md §4.6). `Schema` is the trait
//! the `#[derive(Model)]` macro in `quill-derive` implements for a user
//! record type; everything else here is dialect-aware rendering shared by
//! every generated impl.

use crate::driver::{Connection, DriverKind};
use crate::error::SqlResult;
use crate::pool::Pool;
use crate::value::Value;

/// Ordered SQL type family (spec.md §3, "ColumnInfo"). The ordering mirrors
/// the spec's own listing and is relied on by nothing beyond `Ord`
/// convenience for callers that want to bucket columns by family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Varchar,
    Text,
    LongText,
    Blob,
    Date,
    DateTime,
    Timestamp,
    Time,
    Boolean,
    Json,
    Unknown,
}

impl ColumnType {
    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Int | ColumnType::BigInt)
    }

    /// Promotes a string column's base type to `LongText` when its field
    /// name ends in `content`, `description`, or `body` (spec.md §4.6).
    pub fn promote_text(field_name: &str, base: ColumnType) -> ColumnType {
        if base == ColumnType::Varchar
            && (field_name.ends_with("content") || field_name.ends_with("description") || field_name.ends_with("body"))
        {
            ColumnType::LongText
        } else {
            base
        }
    }

    /// Renders the DDL type name for `dialect`. Bit-width integer families
    /// map as: TINYINT/SMALLINT/INT/BIGINT (MySQL), INTEGER (SQLite),
    /// SMALLINT/INTEGER/BIGINT (PostgreSQL) — spec.md §4.6.
    pub fn ddl(self, dialect: DriverKind, max_length: Option<u32>) -> String {
        match (self, dialect) {
            (ColumnType::TinyInt, DriverKind::MySql) => "TINYINT".to_string(),
            (ColumnType::SmallInt, DriverKind::MySql) => "SMALLINT".to_string(),
            (ColumnType::SmallInt, DriverKind::Postgres) => "SMALLINT".to_string(),
            (ColumnType::Int, DriverKind::MySql) => "INT".to_string(),
            (ColumnType::Int, DriverKind::Postgres) => "INTEGER".to_string(),
            (ColumnType::BigInt, DriverKind::MySql | DriverKind::Postgres) => "BIGINT".to_string(),
            (ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Int | ColumnType::BigInt, _) => {
                "INTEGER".to_string()
            }
            (ColumnType::Float, DriverKind::Postgres) => "REAL".to_string(),
            (ColumnType::Float, _) => "FLOAT".to_string(),
            (ColumnType::Double, DriverKind::Postgres) => "DOUBLE PRECISION".to_string(),
            (ColumnType::Double, DriverKind::MySql) => "DOUBLE".to_string(),
            (ColumnType::Double, _) => "REAL".to_string(),
            (ColumnType::Varchar, _) => format!("VARCHAR({})", max_length.unwrap_or(255)),
            (ColumnType::Text, _) => "TEXT".to_string(),
            (ColumnType::LongText, DriverKind::MySql) => "LONGTEXT".to_string(),
            (ColumnType::LongText, _) => "TEXT".to_string(),
            (ColumnType::Blob, DriverKind::Postgres) => "BYTEA".to_string(),
            (ColumnType::Blob, _) => "BLOB".to_string(),
            (ColumnType::Date, _) => "DATE".to_string(),
            (ColumnType::DateTime, DriverKind::Postgres) => "TIMESTAMP".to_string(),
            (ColumnType::DateTime, _) => "DATETIME".to_string(),
            (ColumnType::Timestamp, _) => "TIMESTAMP".to_string(),
            (ColumnType::Time, _) => "TIME".to_string(),
            (ColumnType::Boolean, DriverKind::MySql) => "TINYINT(1)".to_string(),
            (ColumnType::Boolean, _) => "BOOLEAN".to_string(),
            (ColumnType::Json, DriverKind::Postgres) => "JSONB".to_string(),
            (ColumnType::Json, DriverKind::MySql) => "JSON".to_string(),
            (ColumnType::Json, _) => "TEXT".to_string(),
            (ColumnType::Unknown, _) => "TEXT".to_string(),
        }
    }
}

/// One column's reflected metadata (spec.md §3, "ColumnInfo").
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub default: Option<Value>,
    pub max_length: Option<u32>,
}

impl ColumnInfo {
    pub fn field_definition(&self, dialect: DriverKind) -> String {
        let mut sql = if self.primary_key && self.auto_increment && dialect == DriverKind::Postgres {
            // PostgreSQL spells auto-increment primary keys via SERIAL/BIGSERIAL
            // instead of a DEFAULT/sequence clause bolted onto INTEGER.
            let serial = if self.column_type == ColumnType::BigInt { "BIGSERIAL" } else { "SERIAL" };
            format!("{} {}", self.name, serial)
        } else {
            format!("{} {}", self.name, self.column_type.ddl(dialect, self.max_length))
        };

        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.auto_increment && dialect != DriverKind::Postgres {
                let clause = dialect.auto_increment_clause();
                if !clause.is_empty() {
                    sql.push(' ');
                    sql.push_str(clause);
                }
            }
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }

        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.render_literal(dialect));
        }
        sql
    }
}

/// A table's reflected shape (spec.md §3, "TableSchema"). Invariants:
/// column names unique within a table, at most one primary key,
/// auto-increment implies an integer-family primary key.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Option<&'static str>,
}

impl TableSchema {
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        let mut pk_count = 0;
        for col in &self.columns {
            if !seen.insert(col.name) {
                return Err(format!("duplicate column name `{}` in table `{}`", col.name, self.table_name));
            }
            if col.primary_key {
                pk_count += 1;
            }
            if col.auto_increment && !(col.primary_key && col.column_type.is_integer()) {
                return Err(format!(
                    "column `{}` is auto-increment but not an integer-family primary key",
                    col.name
                ));
            }
        }
        if pk_count > 1 {
            return Err(format!("table `{}` declares more than one primary key", self.table_name));
        }
        Ok(())
    }

    pub fn create_table_sql(&self, dialect: DriverKind) -> String {
        let columns_sql: Vec<String> = self.columns.iter().map(|c| c.field_definition(dialect)).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table_name,
            columns_sql.join(", ")
        )
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table_name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Compile-time schema reflection for a user record type (spec.md §4.6,
/// design note §9). `#[derive(Model)]` in `quill-derive` implements this.
pub trait Schema: Sized + Send + Sync + 'static {
    /// The primary key's Rust type.
    type PrimaryKey: Into<Value> + ToString + Clone + Send + Sync;

    const TABLE_NAME: &'static str;
    const PRIMARY_KEY_NAME: &'static str = "id";
    const SOFT_DELETES: bool = false;
    const TIMESTAMPS: bool = false;

    fn columns() -> &'static [ColumnInfo];

    fn table_schema() -> TableSchema {
        TableSchema {
            table_name: Self::TABLE_NAME.to_string(),
            columns: Self::columns().to_vec(),
            primary_key: Some(Self::PRIMARY_KEY_NAME),
        }
    }

    fn field_names() -> Vec<&'static str> {
        Self::columns().iter().map(|c| c.name).collect()
    }

    fn has_column(name: &str) -> bool {
        Self::columns().iter().any(|c| c.name == name)
    }

    fn create_table_sql(dialect: DriverKind) -> String {
        Self::table_schema().create_table_sql(dialect)
    }

    fn drop_table_sql() -> String {
        Self::table_schema().drop_table_sql()
    }

    /// Returns this record's primary key value.
    fn primary_key(&self) -> Self::PrimaryKey;
}

/// Runs `createAll`/`dropAll`/`refreshAll` across an ordered list of table
/// schemas (spec.md §4.6).
pub struct Migrator;

impl Migrator {
    pub async fn create_all<C: Connection + 'static>(
        pool: &Pool<C>,
        dialect: DriverKind,
        schemas: &[TableSchema],
    ) -> SqlResult<()> {
        let lease = pool.acquire().await?;
        for schema in schemas {
            lease.exec(&schema.create_table_sql(dialect)).await?;
        }
        Ok(())
    }

    pub async fn drop_all<C: Connection + 'static>(pool: &Pool<C>, schemas: &[TableSchema]) -> SqlResult<()> {
        let lease = pool.acquire().await?;
        for schema in schemas.iter().rev() {
            lease.exec(&schema.drop_table_sql()).await?;
        }
        Ok(())
    }

    pub async fn refresh_all<C: Connection + 'static>(
        pool: &Pool<C>,
        dialect: DriverKind,
        schemas: &[TableSchema],
    ) -> SqlResult<()> {
        Self::drop_all(pool, schemas).await?;
        Self::create_all(pool, dialect, schemas).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> TableSchema {
        TableSchema {
            table_name: "products".to_string(),
            columns: vec![
                ColumnInfo {
                    name: "id",
                    column_type: ColumnType::BigInt,
                    nullable: false,
                    primary_key: true,
                    auto_increment: true,
                    default: None,
                    max_length: None,
                },
                ColumnInfo {
                    name: "name",
                    column_type: ColumnType::Varchar,
                    nullable: false,
                    primary_key: false,
                    auto_increment: false,
                    default: None,
                    max_length: Some(255),
                },
            ],
            primary_key: Some("id"),
        }
    }

    #[test]
    fn rejects_duplicate_columns() {
        let mut schema = sample_schema();
        schema.columns.push(schema.columns[1].clone());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn mysql_create_table_uses_auto_increment_keyword() {
        let schema = sample_schema();
        let sql = schema.create_table_sql(DriverKind::MySql);
        assert!(sql.contains("BIGINT PRIMARY KEY AUTO_INCREMENT"));
    }

    #[test]
    fn postgres_create_table_uses_bigserial() {
        let schema = sample_schema();
        let sql = schema.create_table_sql(DriverKind::Postgres);
        assert!(sql.contains("id BIGSERIAL PRIMARY KEY"));
    }

    #[test]
    fn promotes_description_fields_to_longtext() {
        assert_eq!(ColumnType::promote_text("description", ColumnType::Varchar), ColumnType::LongText);
        assert_eq!(ColumnType::promote_text("name", ColumnType::Varchar), ColumnType::Varchar);
    }
}
