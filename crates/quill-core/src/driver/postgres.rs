//! PostgreSQL driver.

use super::{Connection as DriverConnection, DriverKind, ResultSet, Row};
use crate::config::NetworkConnectOptions;
use crate::error::{ErrorKind, SqlError, SqlResult};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Column, ConnectOptions, Connection as SqlxConnectionTrait, Row as SqlxRowExt};
use std::time::Instant;

pub struct PgConnection {
    conn: sqlx::PgConnection,
    last_insert_id: Option<i64>,
}

impl PgConnection {
    pub async fn connect(options: &NetworkConnectOptions) -> SqlResult<Self> {
        let opts = PgConnectOptions::new()
            .host(&options.host)
            .port(options.port)
            .username(&options.user)
            .password(&options.password)
            .database(&options.database);
        let conn = opts
            .connect()
            .await
            .map_err(|e| SqlError::new(ErrorKind::ConnectionFailed, e.to_string()))?;
        Ok(Self {
            conn,
            last_insert_id: None,
        })
    }
}

impl DriverConnection for PgConnection {
    async fn exec(&mut self, sql: &str) -> SqlResult<u64> {
        let started = Instant::now();
        let result = sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| map_error(e, sql, started))?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str) -> SqlResult<ResultSet> {
        let started = Instant::now();
        let rows: Vec<PgRow> = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_error(e, sql, started))?;
        // PostgreSQL has no connection-local last-insert-id; callers use
        // `INSERT ... RETURNING id` and read it back from the result set
        // (see schema.rs's `prepare_insert`).
        if let Some(first) = rows.first() {
            if let Ok(Some(id)) = first.try_get::<Option<i64>, _>(0) {
                self.last_insert_id = Some(id);
            }
        }
        Ok(decode_rows(rows))
    }

    async fn begin_transaction(&mut self) -> SqlResult<()> {
        self.exec("BEGIN").await.map(|_| ())
    }

    async fn commit(&mut self) -> SqlResult<()> {
        self.exec("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> SqlResult<()> {
        self.exec("ROLLBACK").await.map(|_| ())
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    fn driver_kind(&self) -> DriverKind {
        DriverKind::Postgres
    }

    async fn ping(&mut self) -> SqlResult<()> {
        SqlxConnectionTrait::ping(&mut self.conn)
            .await
            .map_err(|e| SqlError::new(ErrorKind::ConnectionLost, e.to_string()))
    }
}

fn decode_rows(rows: Vec<PgRow>) -> ResultSet {
    let fields = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let decoded = rows
        .iter()
        .map(|row| {
            let cells = (0..row.columns().len()).map(|i| decode_cell(row, i)).collect();
            Row::new(cells)
        })
        .collect();
    ResultSet::new(fields, decoded)
}

fn decode_cell(row: &PgRow, index: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(|b| if b { "t".to_string() } else { "f".to_string() });
    }
    None
}

fn map_error(err: sqlx::Error, sql: &str, started: Instant) -> SqlError {
    let duration = started.elapsed();
    let kind = classify(&err);
    let (native_code, native_message) = match &err {
        sqlx::Error::Database(db_err) => (
            db_err.code().and_then(|c| c.parse::<i64>().ok()),
            Some(db_err.message().to_string()),
        ),
        _ => (None, None),
    };
    SqlError::new(kind, err.to_string())
        .with_native(native_code, native_message)
        .with_sql(sql)
        .with_duration(duration)
}

/// PostgreSQL identifies errors by `SQLSTATE` code, not a numeric table
/// like MySQL; `40P01` is deadlock_detected, `57014` is query_canceled.
fn classify(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::PoolTimedOut => ErrorKind::AcquireTimeout,
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) => ErrorKind::ConnectionLost,
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("40P01") => ErrorKind::DeadlockDetected,
            Some("57014") => ErrorKind::QueryTimeout,
            Some("08006") | Some("08003") => ErrorKind::ConnectionLost,
            _ if db_err.is_unique_violation() => ErrorKind::DuplicateKey,
            _ if db_err.is_foreign_key_violation() => ErrorKind::ForeignKeyViolation,
            _ if db_err.is_check_violation() => ErrorKind::CheckViolation,
            _ => ErrorKind::QueryFailed,
        },
        _ => ErrorKind::QueryFailed,
    }
}
