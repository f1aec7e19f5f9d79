//! Eloquent-style ORM (spec.md §4.7): typed CRUD, read/write paths, and the
//! process-wide default-db slot that gives Laravel-like ergonomics to the
//! implicit-db call style.

use crate::driver::{Connection, ResultSet, Row};
use crate::error::{ErrorKind, SqlError, SqlResult};
use crate::pool::Pool;
use crate::query::QueryBuilder;
use crate::schema::Schema;
use crate::value::Value;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Maps a reflected record type to and from query results / column values.
/// `#[derive(Model)]` implements this alongside [`Schema`].
pub trait ModelAccessor: Schema {
    /// Builds a record from one result row, given the field→index cache
    /// built once per [`ResultSet`] (spec.md §4.5, "Key algorithmic
    /// detail"). Missing columns leave the field at its default.
    fn from_row(row: &Row, index: &HashMap<&str, usize>) -> Self;

    /// This record's writable column/value pairs, excluding `ignore_fields`
    /// and (for inserts) an unset auto-increment primary key.
    fn column_values(&self) -> Vec<(&'static str, Value)>;
}

fn rows_to_models<T: ModelAccessor>(mut result: ResultSet) -> Vec<T> {
    let owned_index: HashMap<String, usize> =
        result.field_index_map().into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    let index: HashMap<&str, usize> = owned_index.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    result
        .take_rows()
        .iter()
        .map(|row| T::from_row(row, &index))
        .collect()
}

// --- Process-wide default-db slot (design note §9) -------------------------

type PoolRegistry = RwLock<AHashMap<TypeId, Box<dyn Any + Send + Sync>>>;

static DEFAULT_POOLS: OnceLock<PoolRegistry> = OnceLock::new();

fn registry() -> &'static PoolRegistry {
    DEFAULT_POOLS.get_or_init(|| RwLock::new(AHashMap::new()))
}

/// Sets the process-wide default connection pool for model `T`. Per-model,
/// not global (spec.md §4.7): write-once-per-model at startup; concurrent
/// reads are safe, mutating mid-run is undefined (spec.md §5).
pub fn use_pool<T: 'static, C: Connection + 'static>(pool: Pool<C>) {
    registry().write().insert(TypeId::of::<T>(), Box::new(pool));
}

fn default_pool<T: 'static, C: Connection + 'static>() -> Option<Pool<C>> {
    registry()
        .read()
        .get(&TypeId::of::<T>())
        .and_then(|boxed| boxed.downcast_ref::<Pool<C>>())
        .cloned()
}

fn require_default_pool<T: 'static, C: Connection + 'static>() -> Pool<C> {
    default_pool::<T, C>().unwrap_or_else(|| {
        panic!(
            "no default pool set for this model; call `use_pool::<{}, _>(pool)` first",
            std::any::type_name::<T>()
        )
    })
}

fn base_query<T: ModelAccessor>(pool_dialect: crate::driver::DriverKind) -> QueryBuilder {
    let qb = QueryBuilder::new(T::TABLE_NAME, pool_dialect);
    if T::SOFT_DELETES {
        qb.soft_deletes("deleted_at")
    } else {
        qb
    }
}

fn render_assignments(values: &[(&'static str, Value)], dialect: crate::driver::DriverKind) -> String {
    values
        .iter()
        .map(|(field, value)| format!("{field} = {}", value.render_literal(dialect)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Explicit-db call style: every method takes `&Pool<C>` (spec.md §4.7).
pub trait ModelQuery<C: Connection + 'static>: ModelAccessor {
    async fn find(pool: &Pool<C>, id: impl Into<Value> + Send) -> SqlResult<Option<Self>> {
        let lease = pool.acquire().await?;
        let query = base_query::<Self>(lease.driver_kind()).where_(Self::PRIMARY_KEY_NAME, id).limit(1);
        let result = lease.query(&query.to_sql()).await?;
        Ok(rows_to_models::<Self>(result).into_iter().next())
    }

    async fn find_or_fail(pool: &Pool<C>, id: impl Into<Value> + Send) -> SqlResult<Self> {
        Self::find(pool, id)
            .await?
            .ok_or_else(|| SqlError::new(ErrorKind::ModelNotFound, "model not found"))
    }

    async fn first(pool: &Pool<C>, query: QueryBuilder) -> SqlResult<Option<Self>> {
        let lease = pool.acquire().await?;
        let result = lease.query(&query.limit(1).to_sql()).await?;
        Ok(rows_to_models::<Self>(result).into_iter().next())
    }

    async fn all(pool: &Pool<C>, query: QueryBuilder) -> SqlResult<Vec<Self>> {
        let lease = pool.acquire().await?;
        let result = lease.query(&query.to_sql()).await?;
        Ok(rows_to_models::<Self>(result))
    }

    async fn count(pool: &Pool<C>, query: &QueryBuilder) -> SqlResult<u64> {
        let lease = pool.acquire().await?;
        let result = lease.query(&query.to_count_sql()).await?;
        Ok(scalar_u64(result))
    }

    async fn exists(pool: &Pool<C>, query: &QueryBuilder) -> SqlResult<bool> {
        Ok(Self::count(pool, query).await? > 0)
    }

    async fn pluck(pool: &Pool<C>, query: QueryBuilder, field: &str) -> SqlResult<Vec<Value>> {
        let lease = pool.acquire().await?;
        let result = lease.query(&query.select(&[field]).to_sql()).await?;
        Ok(column_as_values(result))
    }

    async fn get_value(pool: &Pool<C>, id: impl Into<Value> + Send, field: &str) -> SqlResult<Option<Value>> {
        let lease = pool.acquire().await?;
        let query = base_query::<Self>(lease.driver_kind())
            .select(&[field])
            .where_(Self::PRIMARY_KEY_NAME, id)
            .limit(1);
        let result = lease.query(&query.to_sql()).await?;
        Ok(column_as_values(result).into_iter().next())
    }

    /// Re-reads the inserted row via the driver's last-insert-id; fails
    /// with `CreateFailed` if, unexpectedly, no row is found (spec.md
    /// §4.7).
    async fn create(pool: &Pool<C>, values: Vec<(&'static str, Value)>) -> SqlResult<Self> {
        let lease = pool.acquire().await?;
        let fields: Vec<&str> = values.iter().map(|(f, _)| *f).collect();
        let rendered: Vec<String> = values.iter().map(|(_, v)| v.render_literal(lease.driver_kind())).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::TABLE_NAME,
            fields.join(", "),
            rendered.join(", ")
        );
        lease.exec(&sql).await?;
        let id = lease
            .last_insert_id()
            .await
            .ok_or_else(|| SqlError::new(ErrorKind::CreateFailed, "driver returned no last-insert-id"))?;
        drop(lease);
        Self::find(pool, id)
            .await?
            .ok_or_else(|| SqlError::new(ErrorKind::CreateFailed, "inserted row could not be re-read"))
    }

    async fn update(pool: &Pool<C>, id: impl Into<Value> + Send, values: Vec<(&'static str, Value)>) -> SqlResult<u64> {
        let lease = pool.acquire().await?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            Self::TABLE_NAME,
            render_assignments(&values, lease.driver_kind()),
            Self::PRIMARY_KEY_NAME,
            id.into().render_literal(lease.driver_kind()),
        );
        lease.exec(&sql).await
    }

    async fn destroy(pool: &Pool<C>, id: impl Into<Value> + Send) -> SqlResult<u64> {
        let lease = pool.acquire().await?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            Self::TABLE_NAME,
            Self::PRIMARY_KEY_NAME,
            id.into().render_literal(lease.driver_kind()),
        );
        lease.exec(&sql).await
    }

    async fn update_where(pool: &Pool<C>, query: &QueryBuilder, values: Vec<(&'static str, Value)>) -> SqlResult<u64> {
        let lease = pool.acquire().await?;
        let mut sql = format!("UPDATE {} SET {}", Self::TABLE_NAME, render_assignments(&values, lease.driver_kind()));
        if let Some(where_clause) = query.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        lease.exec(&sql).await
    }

    async fn delete_where(pool: &Pool<C>, query: &QueryBuilder) -> SqlResult<u64> {
        let lease = pool.acquire().await?;
        let mut sql = format!("DELETE FROM {}", Self::TABLE_NAME);
        if let Some(where_clause) = query.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        lease.exec(&sql).await
    }

    async fn first_or_create(pool: &Pool<C>, query: QueryBuilder, defaults: Vec<(&'static str, Value)>) -> SqlResult<Self> {
        if let Some(found) = Self::first(pool, query).await? {
            return Ok(found);
        }
        Self::create(pool, defaults).await
    }

    async fn update_or_create(
        pool: &Pool<C>,
        query: QueryBuilder,
        values: Vec<(&'static str, Value)>,
    ) -> SqlResult<Self> {
        if let Some(found) = Self::first(pool, query).await? {
            let id: Value = found.primary_key().into();
            Self::update(pool, id.clone(), values).await?;
            return Self::find_or_fail(pool, id).await;
        }
        Self::create(pool, values).await
    }

    async fn increment(pool: &Pool<C>, id: impl Into<Value> + Send, field: &str, by: i64) -> SqlResult<u64> {
        let lease = pool.acquire().await?;
        let sql = format!(
            "UPDATE {} SET {field} = {field} + {by} WHERE {} = {}",
            Self::TABLE_NAME,
            Self::PRIMARY_KEY_NAME,
            id.into().render_literal(lease.driver_kind()),
        );
        lease.exec(&sql).await
    }

    async fn decrement(pool: &Pool<C>, id: impl Into<Value> + Send, field: &str, by: i64) -> SqlResult<u64> {
        Self::increment(pool, id, field, -by).await
    }

    async fn soft_delete(pool: &Pool<C>, id: impl Into<Value> + Send) -> SqlResult<u64> {
        if !Self::SOFT_DELETES {
            return Err(SqlError::new(ErrorKind::SchemaMismatch, "model does not declare soft_deletes"));
        }
        let lease = pool.acquire().await?;
        let sql = format!(
            "UPDATE {} SET deleted_at = CURRENT_TIMESTAMP WHERE {} = {}",
            Self::TABLE_NAME,
            Self::PRIMARY_KEY_NAME,
            id.into().render_literal(lease.driver_kind()),
        );
        lease.exec(&sql).await
    }

    async fn restore(pool: &Pool<C>, id: impl Into<Value> + Send) -> SqlResult<u64> {
        let lease = pool.acquire().await?;
        let sql = format!(
            "UPDATE {} SET deleted_at = NULL WHERE {} = {}",
            Self::TABLE_NAME,
            Self::PRIMARY_KEY_NAME,
            id.into().render_literal(lease.driver_kind()),
        );
        lease.exec(&sql).await
    }

    /// A loop of `create` (spec.md §4.7); the caller decides whether to
    /// wrap this in a transaction via [`crate::transaction::run_in_transaction`].
    async fn insert_many(pool: &Pool<C>, rows: Vec<Vec<(&'static str, Value)>>) -> SqlResult<Vec<Self>> {
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            created.push(Self::create(pool, row).await?);
        }
        Ok(created)
    }

    async fn sum(pool: &Pool<C>, query: &QueryBuilder, field: &str) -> SqlResult<f64> {
        Self::aggregate(pool, query, "SUM", field).await
    }

    async fn avg(pool: &Pool<C>, query: &QueryBuilder, field: &str) -> SqlResult<f64> {
        Self::aggregate(pool, query, "AVG", field).await
    }

    async fn min(pool: &Pool<C>, query: &QueryBuilder, field: &str) -> SqlResult<Value> {
        Self::aggregate_value(pool, query, "MIN", field).await
    }

    async fn max(pool: &Pool<C>, query: &QueryBuilder, field: &str) -> SqlResult<Value> {
        Self::aggregate_value(pool, query, "MAX", field).await
    }

    async fn aggregate(pool: &Pool<C>, query: &QueryBuilder, func: &str, field: &str) -> SqlResult<f64> {
        let lease = pool.acquire().await?;
        let mut sql = format!("SELECT {func}({field}) FROM {}", Self::TABLE_NAME);
        if let Some(where_clause) = query.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        let result = lease.query(&sql).await?;
        Ok(scalar_f64(result))
    }

    async fn aggregate_value(pool: &Pool<C>, query: &QueryBuilder, func: &str, field: &str) -> SqlResult<Value> {
        let lease = pool.acquire().await?;
        let mut sql = format!("SELECT {func}({field}) FROM {}", Self::TABLE_NAME);
        if let Some(where_clause) = query.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        let result = lease.query(&sql).await?;
        Ok(column_as_values(result).into_iter().next().unwrap_or(Value::Null))
    }

    /// Persists this record's current field values back to its row, keyed
    /// by its own primary key (spec.md §4.7, Eloquent's `$model->save()`).
    async fn save(&self, pool: &Pool<C>) -> SqlResult<u64> {
        let id: Value = self.primary_key().into();
        Self::update(pool, id, self.column_values()).await
    }
}

impl<T: ModelAccessor, C: Connection + 'static> ModelQuery<C> for T {}

/// Implicit-db call style (spec.md §4.7): reads the per-model default pool
/// set by [`use_pool`]. Calling this before `use_pool` panics — a
/// programming error, per spec.md's own wording, not a recoverable
/// `SqlError`.
pub trait ModelQueryImplicit<C: Connection + 'static>: ModelQuery<C> {
    async fn find_implicit(id: impl Into<Value> + Send) -> SqlResult<Option<Self>> {
        Self::find(&require_default_pool::<Self, C>(), id).await
    }

    async fn all_implicit(query: QueryBuilder) -> SqlResult<Vec<Self>> {
        Self::all(&require_default_pool::<Self, C>(), query).await
    }

    async fn create_implicit(values: Vec<(&'static str, Value)>) -> SqlResult<Self> {
        Self::create(&require_default_pool::<Self, C>(), values).await
    }

    async fn update_implicit(id: impl Into<Value> + Send, values: Vec<(&'static str, Value)>) -> SqlResult<u64> {
        Self::update(&require_default_pool::<Self, C>(), id, values).await
    }

    async fn destroy_implicit(id: impl Into<Value> + Send) -> SqlResult<u64> {
        Self::destroy(&require_default_pool::<Self, C>(), id).await
    }
}

impl<T: ModelQuery<C>, C: Connection + 'static> ModelQueryImplicit<C> for T {}

fn scalar_u64(mut result: ResultSet) -> u64 {
    result
        .take_rows()
        .first()
        .and_then(|row| row.get(0))
        .and_then(|cell| cell.parse::<u64>().ok())
        .unwrap_or(0)
}

fn scalar_f64(mut result: ResultSet) -> f64 {
    result
        .take_rows()
        .first()
        .and_then(|row| row.get(0))
        .and_then(|cell| cell.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Single-column result rows as untyped [`Value::Text`]/[`Value::Null`]
/// cells; typed conversion is the caller's job (spec.md §3, mirroring
/// `Row`'s own "typed conversion happens in the mapping layer" note).
fn column_as_values(mut result: ResultSet) -> Vec<Value> {
    result
        .take_rows()
        .iter()
        .map(|row| match row.get(0) {
            Some(cell) => Value::Text(cell.to_string()),
            None => Value::Null,
        })
        .collect()
}

/// A typed list of records, mirroring spec.md §4.7's `List<T>`: an owning
/// container whose iteration and length helpers avoid re-deriving them ad
/// hoc at every call site. Dropping it drops every owned record's fields.
#[derive(Debug, Clone)]
pub struct ModelList<T>(Vec<T>);

impl<T> ModelList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self(items)
    }

    pub fn items(&self) -> &[T] {
        &self.0
    }

    pub fn first(&self) -> Option<&T> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.0.last()
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.0.get(index)
    }

    pub fn each(&self, mut f: impl FnMut(&T)) {
        for item in &self.0 {
            f(item);
        }
    }
}
