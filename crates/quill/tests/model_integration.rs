//! End-to-end exercises of the derived `Model` against a real SQLite
//! connection, covering the round trips spec.md §8 calls out: create/find,
//! updates, aggregates, transaction rollback, and multi-byte text.

use quill::prelude::*;
use quill::{Model, SqlError, Value};
use quill_core::config::{RetryConfig, SqliteConnectOptions};
use quill_core::database::sqlite;
use quill_core::{Database, QueryBuilder};

#[derive(Debug, Default, Clone, Model)]
#[schema(table_name = "products")]
struct Product {
    #[schema(primary_key, auto_increment)]
    id: i64,
    name: String,
    price: f64,
    description: Option<String>,
}

async fn setup() -> Database<quill_core::driver::sqlite::SqliteConnection> {
    let db = sqlite::connect(SqliteConnectOptions::memory(), RetryConfig::default());
    db.exec(&Product::create_table_sql(DriverKind::Sqlite)).await.unwrap();
    db
}

#[tokio::test]
async fn create_and_find_round_trip() {
    let db = setup().await;
    let created = Product::create(
        db.pool(),
        vec![("name", Value::from("Widget")), ("price", Value::from(9.99))],
    )
    .await
    .unwrap();
    assert_eq!(created.name, "Widget");
    assert!(created.id > 0);

    let found = Product::find(db.pool(), created.id).await.unwrap().unwrap();
    assert_eq!(found.price, 9.99);
    assert!(found.description.is_none());
}

#[tokio::test]
async fn find_or_fail_errors_on_missing_row() {
    let db = setup().await;
    let err = Product::find_or_fail(db.pool(), 9_999_i64).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ModelNotFound);
}

#[tokio::test]
async fn update_changes_persist() {
    let db = setup().await;
    let created = Product::create(db.pool(), vec![("name", Value::from("A")), ("price", Value::from(1.0))])
        .await
        .unwrap();
    Product::update(db.pool(), created.id, vec![("price", Value::from(2.5))]).await.unwrap();
    let found = Product::find(db.pool(), created.id).await.unwrap().unwrap();
    assert_eq!(found.price, 2.5);
}

#[tokio::test]
async fn save_persists_every_mutable_field() {
    let db = setup().await;
    let mut created = Product::create(db.pool(), vec![("name", Value::from("A")), ("price", Value::from(1.0))])
        .await
        .unwrap();
    created.name = "Renamed".to_string();
    created.price = 3.25;
    created.save(db.pool()).await.unwrap();

    let found = Product::find(db.pool(), created.id).await.unwrap().unwrap();
    assert_eq!(found.name, "Renamed");
    assert_eq!(found.price, 3.25);
}

#[tokio::test]
async fn destroy_removes_the_row() {
    let db = setup().await;
    let created = Product::create(db.pool(), vec![("name", Value::from("Gone")), ("price", Value::from(1.0))])
        .await
        .unwrap();
    Product::destroy(db.pool(), created.id).await.unwrap();
    assert!(Product::find(db.pool(), created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn aggregate_sum_matches_inserted_rows() {
    let db = setup().await;
    Product::create(db.pool(), vec![("name", Value::from("A")), ("price", Value::from(1.5))]).await.unwrap();
    Product::create(db.pool(), vec![("name", Value::from("B")), ("price", Value::from(2.5))]).await.unwrap();

    let query = QueryBuilder::new("products", DriverKind::Sqlite);
    let total = Product::sum(db.pool(), &query, "price").await.unwrap();
    assert!((total - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn transaction_rollback_leaves_no_row_behind() {
    let db = setup().await;
    let result = db
        .transaction(|tx| async move {
            tx.exec("INSERT INTO products (name, price) VALUES ('Temp', 1.0)").await?;
            Err::<(), SqlError>(SqlError::new(ErrorKind::QueryFailed, "force rollback"))
        })
        .await;
    assert!(result.is_err());

    let query = QueryBuilder::new("products", DriverKind::Sqlite);
    let count = Product::count(db.pool(), &query).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn multi_byte_text_round_trips_untouched() {
    let db = setup().await;
    let created = Product::create(
        db.pool(),
        vec![("name", Value::from("张三的产品")), ("price", Value::from(0.0))],
    )
    .await
    .unwrap();

    let found = Product::find(db.pool(), created.id).await.unwrap().unwrap();
    assert_eq!(found.name, "张三的产品");
}

#[tokio::test]
async fn update_where_applies_to_the_filtered_set_only() {
    let db = setup().await;
    let cheap = Product::create(db.pool(), vec![("name", Value::from("Cheap")), ("price", Value::from(1.0))])
        .await
        .unwrap();
    let pricey = Product::create(db.pool(), vec![("name", Value::from("Pricey")), ("price", Value::from(100.0))])
        .await
        .unwrap();

    let query = QueryBuilder::new("products", DriverKind::Sqlite).where_op("price", "<", 10.0);
    Product::update_where(db.pool(), &query, vec![("name", Value::from("Discounted"))]).await.unwrap();

    let cheap = Product::find(db.pool(), cheap.id).await.unwrap().unwrap();
    let pricey = Product::find(db.pool(), pricey.id).await.unwrap().unwrap();
    assert_eq!(cheap.name, "Discounted");
    assert_eq!(pricey.name, "Pricey");
}
