//! SQLite driver: file or `:memory:`, WAL + `synchronous = NORMAL` applied
//! on open (spec.md §4.1, §6).

use super::{Connection as DriverConnection, DriverKind, ResultSet, Row};
use crate::config::SqliteConnectOptions;
use crate::error::{ErrorKind, SqlError, SqlResult};
use sqlx::sqlite::{SqliteConnectOptions as SqlxSqliteOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Row as SqlxRowExt};
use std::str::FromStr;
use std::time::Instant;

pub struct SqliteConnection {
    conn: sqlx::SqliteConnection,
    last_insert_id: Option<i64>,
}

impl SqliteConnection {
    pub async fn connect(options: &SqliteConnectOptions) -> SqlResult<Self> {
        let opts = SqlxSqliteOptions::from_str(&options.path)
            .map_err(|e| map_connect_error(e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let conn = opts.connect().await.map_err(map_connect_error)?;
        Ok(Self {
            conn,
            last_insert_id: None,
        })
    }
}

impl DriverConnection for SqliteConnection {
    async fn exec(&mut self, sql: &str) -> SqlResult<u64> {
        let started = Instant::now();
        let result = sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| map_error(e, sql, started))?;
        self.last_insert_id = Some(result.last_insert_rowid());
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str) -> SqlResult<ResultSet> {
        let started = Instant::now();
        let rows: Vec<SqliteRow> = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_error(e, sql, started))?;
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
        DriverKind::Sqlite
    }

    async fn ping(&mut self) -> SqlResult<()> {
        self.query("SELECT 1").await.map(|_| ())
    }
}

fn decode_rows(rows: Vec<SqliteRow>) -> ResultSet {
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

fn decode_cell(row: &SqliteRow, index: usize) -> Option<String> {
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
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map(|bytes| crate::value::hex_encode(&bytes));
    }
    None
}

fn map_connect_error(err: impl std::error::Error) -> SqlError {
    SqlError::new(ErrorKind::ConnectionFailed, err.to_string())
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

fn classify(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::PoolTimedOut => ErrorKind::AcquireTimeout,
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) => ErrorKind::ConnectionLost,
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_ascii_lowercase();
            if db_err.is_unique_violation() {
                ErrorKind::DuplicateKey
            } else if db_err.is_foreign_key_violation() {
                ErrorKind::ForeignKeyViolation
            } else if db_err.is_check_violation() {
                ErrorKind::CheckViolation
            } else if message.contains("database is locked") || message.contains("busy") {
                ErrorKind::LockTimeout
            } else if message.contains("not null") {
                ErrorKind::NotNullViolation
            } else {
                ErrorKind::QueryFailed
            }
        }
        _ => ErrorKind::QueryFailed,
    }
}
