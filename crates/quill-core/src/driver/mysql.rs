//! MySQL / MariaDB / TiDB driver.

use super::{Connection as DriverConnection, DriverKind, ResultSet, Row};
use crate::config::NetworkConnectOptions;
use crate::error::{ErrorKind, SqlError, SqlResult};
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection as SqlxConnectionTrait, Row as SqlxRowExt};
use std::time::Instant;

pub struct MySqlConnection {
    conn: sqlx::MySqlConnection,
    last_insert_id: Option<i64>,
}

impl MySqlConnection {
    pub async fn connect(options: &NetworkConnectOptions) -> SqlResult<Self> {
        let opts = MySqlConnectOptions::new()
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

impl DriverConnection for MySqlConnection {
    async fn exec(&mut self, sql: &str) -> SqlResult<u64> {
        let started = Instant::now();
        let result = sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| map_error(e, sql, started))?;
        self.last_insert_id = Some(result.last_insert_id() as i64);
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str) -> SqlResult<ResultSet> {
        let started = Instant::now();
        let rows: Vec<MySqlRow> = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_error(e, sql, started))?;
        Ok(decode_rows(rows))
    }

    async fn begin_transaction(&mut self) -> SqlResult<()> {
        self.exec("START TRANSACTION").await.map(|_| ())
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
        DriverKind::MySql
    }

    async fn ping(&mut self) -> SqlResult<()> {
        SqlxConnectionTrait::ping(&mut self.conn)
            .await
            .map_err(|e| SqlError::new(ErrorKind::ConnectionLost, e.to_string()))
    }
}

fn decode_rows(rows: Vec<MySqlRow>) -> ResultSet {
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

fn decode_cell(row: &MySqlRow, index: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(|b| if b { "1".to_string() } else { "0".to_string() });
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

/// Per-driver native-code table (spec.md §4.1): 1062 duplicate key, 1213
/// deadlock, 2013 connection lost.
fn classify(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::PoolTimedOut => ErrorKind::AcquireTimeout,
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) => ErrorKind::ConnectionLost,
        sqlx::Error::Database(db_err) => {
            match db_err.code().and_then(|c| c.parse::<u32>().ok()) {
                Some(1062) => ErrorKind::DuplicateKey,
                Some(1213) => ErrorKind::DeadlockDetected,
                Some(2013) => ErrorKind::ConnectionLost,
                Some(1205) => ErrorKind::LockTimeout,
                Some(1451) | Some(1452) => ErrorKind::ForeignKeyViolation,
                Some(1048) => ErrorKind::NotNullViolation,
                _ if db_err.is_unique_violation() => ErrorKind::DuplicateKey,
                _ if db_err.is_foreign_key_violation() => ErrorKind::ForeignKeyViolation,
                _ => ErrorKind::QueryFailed,
            }
        }
        _ => ErrorKind::QueryFailed,
    }
}
