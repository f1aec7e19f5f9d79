//! Transaction leases (spec.md §4.3): `commit`/`rollback` are idempotent
//! guards, and dropping a `Transaction` without calling either rolls back.

use crate::driver::{Connection, ResultSet};
use crate::error::{ErrorKind, SqlError, SqlResult};
use crate::pool::{Lease, Pool};

/// A transaction leased from a [`Pool`]. All statements issued through it
/// route to the leased connection exclusively; no other caller can
/// interleave statements on the same underlying connection.
pub struct Transaction<C: Connection + 'static> {
    lease: Option<Lease<C>>,
    committed: bool,
    rolled_back: bool,
}

impl<C: Connection + 'static> Transaction<C> {
    pub async fn begin(pool: &Pool<C>) -> SqlResult<Self> {
        let lease = pool.acquire().await?;
        lease.begin_transaction().await?;
        Ok(Self {
            lease: Some(lease),
            committed: false,
            rolled_back: false,
        })
    }

    fn lease(&self) -> &Lease<C> {
        self.lease.as_ref().expect("transaction already finished")
    }

    pub async fn exec(&self, sql: &str) -> SqlResult<u64> {
        self.lease().exec(sql).await
    }

    pub async fn query(&self, sql: &str) -> SqlResult<ResultSet> {
        self.lease().query(sql).await
    }

    /// Commits the transaction. A second call fails with
    /// `TransactionAlreadyFinished` (spec.md §8 testable property).
    pub async fn commit(&mut self) -> SqlResult<()> {
        if self.committed || self.rolled_back {
            return Err(SqlError::new(
                ErrorKind::TransactionAlreadyFinished,
                "transaction already finished",
            ));
        }
        self.lease().commit().await?;
        self.committed = true;
        Ok(())
    }

    /// Rolls back the transaction. A second call fails with
    /// `TransactionAlreadyFinished`.
    pub async fn rollback(&mut self) -> SqlResult<()> {
        if self.committed || self.rolled_back {
            return Err(SqlError::new(
                ErrorKind::TransactionAlreadyFinished,
                "transaction already finished",
            ));
        }
        self.lease().rollback().await?;
        self.rolled_back = true;
        Ok(())
    }
}

impl<C: Connection + 'static> Drop for Transaction<C> {
    fn drop(&mut self) {
        // Releasing the lease without a prior commit/rollback already
        // rolls back server-side (pool.release rolls back any connection
        // still flagged in_transaction); dropping the lease here is enough
        // to trigger that path.
        self.lease.take();
    }
}

/// Runs `f` inside a transaction: rolls back on any error or propagated
/// failure, commits otherwise (spec.md §4.3, `Database::transaction`).
pub async fn run_in_transaction<C, T, F, Fut>(pool: &Pool<C>, f: F) -> SqlResult<T>
where
    C: Connection + 'static,
    F: FnOnce(&Transaction<C>) -> Fut,
    Fut: std::future::Future<Output = SqlResult<T>>,
{
    let mut tx = Transaction::begin(pool).await?;
    match f(&tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}
