//! Relations & eager loading (spec.md §4.8): `hasOne`/`hasMany`/`belongsTo`
//! relation queries, plus batched `with()` eager loading that avoids N+1
//! round trips by issuing a single `WHERE fk IN (...)` query and grouping
//! the results in memory.

use crate::driver::Connection;
use crate::error::SqlResult;
use crate::model::{ModelAccessor, ModelQuery};
use crate::pool::Pool;
use crate::query::QueryBuilder;
use crate::schema::Schema;
use crate::value::Value;
use std::collections::HashMap;

/// The relation's cardinality, which only affects whether the underlying
/// query is capped at one row (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cardinality {
    One,
    Many,
}

/// A query scoped to one side of a relation, built by [`has_one`],
/// [`has_many`], or [`belongs_to`]. Further filter/order/limit chaining
/// composes exactly like [`QueryBuilder`], since `RelationQuery` wraps one.
pub struct RelationQuery<Related: ModelAccessor> {
    query: QueryBuilder,
    cardinality: Cardinality,
    _related: std::marker::PhantomData<Related>,
}

impl<Related: ModelAccessor> RelationQuery<Related> {
    fn new(query: QueryBuilder, cardinality: Cardinality) -> Self {
        Self {
            query,
            cardinality,
            _related: std::marker::PhantomData,
        }
    }

    /// Additional equality filter on the related table.
    pub fn where_(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query = self.query.where_(field, value);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.query = self.query.order_by(field, desc);
        self
    }

    /// Overrides the default cap (1 for `hasOne`/`belongsTo`, unbounded for
    /// `hasMany`) with an explicit limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    fn finalize(self) -> QueryBuilder {
        match self.cardinality {
            Cardinality::One => self.query.limit(1),
            Cardinality::Many => self.query,
        }
    }

    pub async fn get<C: Connection + 'static>(self, pool: &Pool<C>) -> SqlResult<Vec<Related>> {
        Related::all(pool, self.finalize()).await
    }

    pub async fn first<C: Connection + 'static>(self, pool: &Pool<C>) -> SqlResult<Option<Related>> {
        Related::first(pool, self.finalize()).await
    }

    pub async fn count<C: Connection + 'static>(self, pool: &Pool<C>) -> SqlResult<u64> {
        let query = self.finalize();
        Related::count(pool, &query).await
    }

    pub async fn exists<C: Connection + 'static>(self, pool: &Pool<C>) -> SqlResult<bool> {
        let query = self.finalize();
        Related::exists(pool, &query).await
    }
}

/// `Owner.hasOne(Related, foreign_key)` (spec.md §4.8): the related row
/// whose `foreign_key` column equals the owner's primary key. Capped at
/// one row. `dialect` is normally `lease.driver_kind()` from an already
/// acquired connection, since a relation query's dialect is only known
/// once a pool is in hand.
pub fn has_one<Owner: Schema, Related: ModelAccessor>(
    dialect: crate::driver::DriverKind,
    owner_id: impl Into<Value>,
    foreign_key: &str,
) -> RelationQuery<Related> {
    let query = QueryBuilder::new(Related::TABLE_NAME, dialect).where_(foreign_key.to_string(), owner_id);
    RelationQuery::new(query, Cardinality::One)
}

/// `Owner.hasMany(Related, foreign_key)` (spec.md §4.8): every related row
/// whose `foreign_key` column equals the owner's primary key.
pub fn has_many<Owner: Schema, Related: ModelAccessor>(
    dialect: crate::driver::DriverKind,
    owner_id: impl Into<Value>,
    foreign_key: &str,
) -> RelationQuery<Related> {
    let query = QueryBuilder::new(Related::TABLE_NAME, dialect).where_(foreign_key.to_string(), owner_id);
    RelationQuery::new(query, Cardinality::Many)
}

/// `Child.belongsTo(Related, foreign_key_value)` (spec.md §4.8): the single
/// owning row on the other side, matched by `Related`'s own primary key.
pub fn belongs_to<Related: ModelAccessor>(
    dialect: crate::driver::DriverKind,
    foreign_key_value: impl Into<Value>,
) -> RelationQuery<Related> {
    let query = QueryBuilder::new(Related::TABLE_NAME, dialect).where_(Related::PRIMARY_KEY_NAME, foreign_key_value);
    RelationQuery::new(query, Cardinality::One)
}

/// One main record paired with its eagerly loaded related rows.
#[derive(Debug, Clone)]
pub struct WithRelated<Main, Related> {
    pub main: Main,
    pub related: Vec<Related>,
}

/// Eager loading (spec.md §4.8, `with(Related, fk)`): issues exactly one
/// batched `WHERE fk IN (...)` query for every `main` record instead of one
/// query per record, then groups the results in memory by `fk`.
///
/// `main_key` extracts the value each related row's `foreign_key` column is
/// matched against (typically the main record's primary key); `group_key`
/// extracts the matching value back out of each related row.
pub async fn with<Main, Related, C>(
    pool: &Pool<C>,
    main: Vec<Main>,
    foreign_key: &str,
    main_key: impl Fn(&Main) -> Value,
    group_key: impl Fn(&Related) -> Value,
) -> SqlResult<Vec<WithRelated<Main, Related>>>
where
    Related: ModelAccessor,
    C: Connection + 'static,
{
    if main.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Value> = main.iter().map(&main_key).collect();
    let dialect = pool.acquire().await?.driver_kind();
    let query = QueryBuilder::new(Related::TABLE_NAME, dialect).where_in(foreign_key, ids);
    let related_rows = Related::all(pool, query).await?;

    let mut grouped: HashMap<String, Vec<Related>> = HashMap::new();
    for row in related_rows {
        let key = group_key(&row).to_string();
        grouped.entry(key).or_default().push(row);
    }

    Ok(main
        .into_iter()
        .map(|record| {
            let key = main_key(&record).to_string();
            let related = grouped.remove(&key).unwrap_or_default();
            WithRelated { main: record, related }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_related_groups_by_key() {
        // Groups purely in-memory; exercised end-to-end against the
        // in-memory driver in tests/orm.rs.
        let mut grouped: HashMap<String, Vec<i32>> = HashMap::new();
        grouped.entry("1".to_string()).or_default().push(10);
        grouped.entry("1".to_string()).or_default().push(11);
        assert_eq!(grouped.get("1").unwrap().len(), 2);
    }
}
