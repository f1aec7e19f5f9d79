//! End-to-end relations/eager-loading exercise against a real SQLite
//! connection (spec.md §4.8). `Author`/`Book` implement `Schema` and
//! `ModelAccessor` by hand here (quill-core itself has no dependency on
//! `quill-derive`'s macro); `crates/quill/tests/model_integration.rs` covers
//! the derive-macro path instead.

use quill_core::config::{RetryConfig, SqliteConnectOptions};
use quill_core::database::sqlite;
use quill_core::driver::{DriverKind, Row};
use quill_core::model::{ModelAccessor, ModelQuery};
use quill_core::relations;
use quill_core::schema::{ColumnInfo, ColumnType, Schema};
use quill_core::value::Value;
use quill_core::{Database, QueryBuilder};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct Author {
    id: i64,
    name: String,
}

impl Schema for Author {
    type PrimaryKey = i64;
    const TABLE_NAME: &'static str = "authors";

    fn columns() -> &'static [ColumnInfo] {
        static COLUMNS: std::sync::OnceLock<Vec<ColumnInfo>> = std::sync::OnceLock::new();
        COLUMNS
            .get_or_init(|| {
                vec![
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
                ]
            })
            .as_slice()
    }

    fn primary_key(&self) -> Self::PrimaryKey {
        self.id
    }
}

impl ModelAccessor for Author {
    fn from_row(row: &Row, index: &HashMap<&str, usize>) -> Self {
        let mut model = Self::default();
        if let Some(&idx) = index.get("id") {
            if let Some(cell) = row.get(idx) {
                if let Ok(v) = cell.parse::<i64>() {
                    model.id = v;
                }
            }
        }
        if let Some(&idx) = index.get("name") {
            if let Some(cell) = row.get(idx) {
                model.name = cell.to_string();
            }
        }
        model
    }

    fn column_values(&self) -> Vec<(&'static str, Value)> {
        vec![("name", Value::from(self.name.clone()))]
    }
}

#[derive(Debug, Clone, Default)]
struct Book {
    id: i64,
    author_id: i64,
    title: String,
}

impl Schema for Book {
    type PrimaryKey = i64;
    const TABLE_NAME: &'static str = "books";

    fn columns() -> &'static [ColumnInfo] {
        static COLUMNS: std::sync::OnceLock<Vec<ColumnInfo>> = std::sync::OnceLock::new();
        COLUMNS
            .get_or_init(|| {
                vec![
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
                        name: "author_id",
                        column_type: ColumnType::BigInt,
                        nullable: false,
                        primary_key: false,
                        auto_increment: false,
                        default: None,
                        max_length: None,
                    },
                    ColumnInfo {
                        name: "title",
                        column_type: ColumnType::Varchar,
                        nullable: false,
                        primary_key: false,
                        auto_increment: false,
                        default: None,
                        max_length: Some(255),
                    },
                ]
            })
            .as_slice()
    }

    fn primary_key(&self) -> Self::PrimaryKey {
        self.id
    }
}

impl ModelAccessor for Book {
    fn from_row(row: &Row, index: &HashMap<&str, usize>) -> Self {
        let mut model = Self::default();
        if let Some(&idx) = index.get("id") {
            if let Some(cell) = row.get(idx) {
                if let Ok(v) = cell.parse::<i64>() {
                    model.id = v;
                }
            }
        }
        if let Some(&idx) = index.get("author_id") {
            if let Some(cell) = row.get(idx) {
                if let Ok(v) = cell.parse::<i64>() {
                    model.author_id = v;
                }
            }
        }
        if let Some(&idx) = index.get("title") {
            if let Some(cell) = row.get(idx) {
                model.title = cell.to_string();
            }
        }
        model
    }

    fn column_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("author_id", Value::from(self.author_id)),
            ("title", Value::from(self.title.clone())),
        ]
    }
}

async fn setup() -> Database<quill_core::driver::sqlite::SqliteConnection> {
    let db = sqlite::connect(SqliteConnectOptions::memory(), RetryConfig::default());
    db.exec(&Author::create_table_sql(DriverKind::Sqlite)).await.unwrap();
    db.exec(&Book::create_table_sql(DriverKind::Sqlite)).await.unwrap();
    db
}

#[tokio::test]
async fn has_many_returns_only_the_owners_rows() {
    let db = setup().await;
    let pool = db.pool();

    let tolkien = Author::create(pool, vec![("name", Value::from("Tolkien"))]).await.unwrap();
    let lewis = Author::create(pool, vec![("name", Value::from("Lewis"))]).await.unwrap();
    Book::create(pool, vec![("author_id", Value::from(tolkien.id)), ("title", Value::from("The Hobbit"))])
        .await
        .unwrap();
    Book::create(pool, vec![("author_id", Value::from(tolkien.id)), ("title", Value::from("LOTR"))])
        .await
        .unwrap();
    Book::create(pool, vec![("author_id", Value::from(lewis.id)), ("title", Value::from("Narnia"))])
        .await
        .unwrap();

    let books = relations::has_many::<Author, Book>(DriverKind::Sqlite, tolkien.id, "author_id")
        .get(pool)
        .await
        .unwrap();
    assert_eq!(books.len(), 2);
    assert!(books.iter().all(|b| b.author_id == tolkien.id));
}

#[tokio::test]
async fn with_eager_loads_without_n_plus_one_round_trips() {
    let db = setup().await;
    let pool = db.pool();

    let tolkien = Author::create(pool, vec![("name", Value::from("Tolkien"))]).await.unwrap();
    let lewis = Author::create(pool, vec![("name", Value::from("Lewis"))]).await.unwrap();
    Book::create(pool, vec![("author_id", Value::from(tolkien.id)), ("title", Value::from("The Hobbit"))])
        .await
        .unwrap();
    Book::create(pool, vec![("author_id", Value::from(lewis.id)), ("title", Value::from("Narnia"))])
        .await
        .unwrap();

    let authors = Author::all(pool, QueryBuilder::new("authors", DriverKind::Sqlite)).await.unwrap();
    let with_books = relations::with::<Author, Book, _>(
        pool,
        authors,
        "author_id",
        |a: &Author| Value::from(a.id),
        |b: &Book| Value::from(b.author_id),
    )
    .await
    .unwrap();

    assert_eq!(with_books.len(), 2);
    for entry in &with_books {
        assert_eq!(entry.related.len(), 1);
        assert_eq!(entry.related[0].author_id, entry.main.id);
    }
}
