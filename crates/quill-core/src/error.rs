//! SQL error taxonomy, thread-local last-error slot, and the retry runner.
//!
//! Two parallel channels mirror the ones a caller actually needs: a coarse
//! [`ErrorKind`] returned from every fallible call, and a detailed
//! [`SqlError`] record stashed in a thread-local slot that a caller may
//! inspect with [`get_last_error`] and must clear with [`clear_last_error`]
//! between requests.

use crate::config::RetryConfig;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Coarse error classification, grouped into stable numeric ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // connection (2100s)
    ConnectionFailed,
    ConnectionLost,
    ConnectionTimeout,
    ServerGone,
    BrokenPipe,
    PoolExhausted,
    AcquireTimeout,
    // query (2200s)
    QueryFailed,
    QueryTimeout,
    SyntaxError,
    // transaction (2300s)
    TransactionFailed,
    TransactionAlreadyFinished,
    DeadlockDetected,
    LockTimeout,
    // data integrity (2400s)
    DuplicateKey,
    ForeignKeyViolation,
    NotNullViolation,
    CheckViolation,
    // permission (2500s)
    PermissionDenied,
    // model / ORM (2600s)
    ModelNotFound,
    PrimaryKeyNotFound,
    CreateFailed,
    TableNotAllowed,
    SchemaMismatch,
}

impl ErrorKind {
    /// The stable numeric code for this kind.
    pub fn code(self) -> u32 {
        use ErrorKind::*;
        match self {
            ConnectionFailed => 2100,
            ConnectionLost => 2101,
            ConnectionTimeout => 2102,
            ServerGone => 2103,
            BrokenPipe => 2104,
            PoolExhausted => 2105,
            AcquireTimeout => 2106,
            QueryFailed => 2200,
            QueryTimeout => 2201,
            SyntaxError => 2202,
            TransactionFailed => 2300,
            TransactionAlreadyFinished => 2301,
            DeadlockDetected => 2302,
            LockTimeout => 2303,
            DuplicateKey => 2400,
            ForeignKeyViolation => 2401,
            NotNullViolation => 2402,
            CheckViolation => 2403,
            PermissionDenied => 2500,
            ModelNotFound => 2600,
            PrimaryKeyNotFound => 2601,
            CreateFailed => 2602,
            TableNotAllowed => 2603,
            SchemaMismatch => 2604,
        }
    }

    /// `true` only for transient classes that a retry policy may re-run.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionLost
                | ErrorKind::ConnectionTimeout
                | ErrorKind::ServerGone
                | ErrorKind::BrokenPipe
                | ErrorKind::QueryTimeout
                | ErrorKind::DeadlockDetected
                | ErrorKind::LockTimeout
                | ErrorKind::PoolExhausted
        )
    }

    /// `true` for kinds that must also mark the owning pooled connection broken.
    pub fn is_connection_error(self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionLost
                | ErrorKind::ConnectionFailed
                | ErrorKind::ServerGone
                | ErrorKind::BrokenPipe
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

const SQL_CLIP_LEN: usize = 500;

/// A detailed SQL error record, stashed in the thread-local last-error slot
/// and returned (as the coarse [`ErrorKind`] alone) from fallible calls.
#[derive(Debug, Clone)]
pub struct SqlError {
    pub kind: ErrorKind,
    pub message: String,
    pub native_code: Option<i64>,
    pub native_message: Option<String>,
    pub sql: Option<String>,
    pub table: Option<String>,
    pub operation: Option<String>,
    pub duration_ms: u64,
    pub retry_count: u32,
}

impl SqlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            native_code: None,
            native_message: None,
            sql: None,
            table: None,
            operation: None,
            duration_ms: 0,
            retry_count: 0,
        }
    }

    pub fn with_native(mut self, code: Option<i64>, message: Option<String>) -> Self {
        self.native_code = code;
        self.native_message = message;
        self
    }

    pub fn with_sql(mut self, sql: &str) -> Self {
        self.sql = Some(clip_sql(sql));
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

fn clip_sql(sql: &str) -> String {
    if sql.chars().count() <= SQL_CLIP_LEN {
        sql.to_string()
    } else {
        let clipped: String = sql.chars().take(SQL_CLIP_LEN).collect();
        format!("{clipped}...")
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)?;
        if let Some(table) = &self.table {
            write!(f, " (table: {table})")?;
        }
        if let Some(sql) = &self.sql {
            write!(f, " (sql: {sql})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SqlError {}

/// Convenience alias used across the crate for fallible calls.
pub type SqlResult<T> = Result<T, SqlError>;

thread_local! {
    static LAST_ERROR: RefCell<Option<SqlError>> = const { RefCell::new(None) };
}

/// Stores `err` in the thread-local slot and returns its coarse kind.
pub fn set_last_error(err: SqlError) -> ErrorKind {
    let kind = err.kind;
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err));
    kind
}

/// Returns a clone of the last error stored on this thread, if any.
pub fn get_last_error() -> Option<SqlError> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clears the thread-local last-error slot.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Runs `op`, retrying on failure per `config` with exponential backoff.
///
/// Each failed attempt is stashed in the thread-local slot with its
/// `retry_count` stamped, so that after a successful retry the last detail
/// still reports the number of non-terminal attempts that preceded it.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> SqlResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SqlResult<T>>,
{
    let mut attempt: u32 = 0;
    let mut delay_ms = config.initial_delay_ms;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(mut err) => {
                let retryable = if config.retry_only_retryable {
                    err.is_retryable()
                } else {
                    true
                };
                if !retryable || attempt >= config.max_retries {
                    err.retry_count = attempt;
                    set_last_error(err.clone());
                    return Err(err);
                }
                attempt += 1;
                err.retry_count = attempt;
                set_last_error(err.clone());
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = ((delay_ms as f64) * config.backoff_multiplier) as u64;
                delay_ms = delay_ms.min(config.max_delay_ms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_set_matches_spec() {
        assert!(ErrorKind::ConnectionLost.is_retryable());
        assert!(ErrorKind::DeadlockDetected.is_retryable());
        assert!(ErrorKind::PoolExhausted.is_retryable());
        assert!(!ErrorKind::ModelNotFound.is_retryable());
        assert!(!ErrorKind::DuplicateKey.is_retryable());
    }

    #[test]
    fn clips_long_sql() {
        let sql = "x".repeat(600);
        let err = SqlError::new(ErrorKind::QueryFailed, "boom").with_sql(&sql);
        assert_eq!(err.sql.unwrap().chars().count(), SQL_CLIP_LEN + 3);
    }

    #[test]
    fn last_error_slot_is_per_thread() {
        clear_last_error();
        assert!(get_last_error().is_none());
        set_last_error(SqlError::new(ErrorKind::QueryFailed, "oops"));
        assert!(get_last_error().is_some());
        clear_last_error();
        assert!(get_last_error().is_none());
    }

    #[tokio::test]
    async fn with_retry_stamps_retry_count_on_eventual_success() {
        clear_last_error();
        let config = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            retry_only_retryable: true,
        };
        let mut calls = 0;
        let result: SqlResult<i32> = with_retry(&config, || {
            calls += 1;
            let call = calls;
            async move {
                if call < 2 {
                    Err(SqlError::new(ErrorKind::DeadlockDetected, "deadlock"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        let last = get_last_error().unwrap();
        assert_eq!(last.retry_count, 1);
    }
}
