//! The in-memory test driver named in spec.md §4.1: a dependency-free
//! stand-in used to exercise the pool, transaction, and retry machinery
//! without a real RDBMS underneath.

use super::{Connection, DriverKind, ResultSet, Row};
use crate::error::{ErrorKind, SqlError, SqlResult};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering::Relaxed};
use std::sync::Arc;

/// Shared fault-injection switch for a group of [`MemoryConnection`]s, so
/// tests can flip connections unhealthy mid-run.
#[derive(Debug, Clone, Default)]
pub struct MemoryFault(Arc<AtomicBool>);

impl MemoryFault {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn trip(&self) {
        self.0.store(true, Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Relaxed);
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Relaxed)
    }
}

/// An in-process connection that simulates a tiny single-row store.
#[derive(Debug)]
pub struct MemoryConnection {
    fault: MemoryFault,
    last_insert_id: AtomicI64,
    in_transaction: bool,
}

impl MemoryConnection {
    pub fn new(fault: MemoryFault) -> Self {
        Self {
            fault,
            last_insert_id: AtomicI64::new(0),
            in_transaction: false,
        }
    }

    fn check_fault(&self) -> SqlResult<()> {
        if self.fault.is_tripped() {
            Err(SqlError::new(ErrorKind::ConnectionLost, "memory driver fault injected"))
        } else {
            Ok(())
        }
    }
}

impl Connection for MemoryConnection {
    async fn exec(&mut self, sql: &str) -> SqlResult<u64> {
        self.check_fault()?;
        if sql.to_ascii_uppercase().starts_with("INSERT") {
            self.last_insert_id.fetch_add(1, Relaxed);
            return Ok(1);
        }
        Ok(0)
    }

    async fn query(&mut self, sql: &str) -> SqlResult<ResultSet> {
        self.check_fault()?;
        if sql.trim() == "SELECT 1" {
            return Ok(ResultSet::new(
                vec!["1".to_string()],
                vec![Row::new(vec![Some("1".to_string())])],
            ));
        }
        Ok(ResultSet::empty())
    }

    async fn begin_transaction(&mut self) -> SqlResult<()> {
        self.check_fault()?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> SqlResult<()> {
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> SqlResult<()> {
        self.in_transaction = false;
        Ok(())
    }

    fn last_insert_id(&self) -> Option<i64> {
        Some(self.last_insert_id.load(Relaxed))
    }

    fn driver_kind(&self) -> DriverKind {
        DriverKind::Memory
    }

    async fn ping(&mut self) -> SqlResult<()> {
        self.check_fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trips_fault_into_connection_lost() {
        let fault = MemoryFault::new();
        let mut conn = MemoryConnection::new(fault.clone());
        conn.ping().await.unwrap();
        fault.trip();
        let err = conn.ping().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionLost);
    }
}
