//! Capabilities the core requires from a connection pool / driver.
//!
//! The core only borrows these: it prepares and executes statements, opens
//! transactions and finishes them, and never looks inside a result beyond
//! passing it back to the caller.

use async_trait::async_trait;

use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// A compiled statement bound to the pool rather than to one connection.
///
/// Carries no per-call state, so one instance can be shared by any number of
/// concurrent callers and re-executed with fresh arguments.
#[async_trait]
pub trait PoolStatement: Send + Sync + 'static {
    /// The query text this statement was compiled from.
    fn sql(&self) -> &str;

    /// Execute as DML, returning the number of rows affected.
    async fn execute(&self, params: &[RowValues]) -> Result<usize, DriverError>;

    /// Execute as a query and materialise the rows.
    async fn query(&self, params: &[RowValues]) -> Result<ResultSet, DriverError>;
}

/// An open transaction on a single connection. Not safe for concurrent use.
#[async_trait]
pub trait DbTransaction: Send + 'static {
    /// Statement prepared through this transaction. Never valid after commit/rollback.
    type Prepared: Send + Sync;

    async fn prepare(&mut self, query: &str) -> Result<Self::Prepared, DriverError>;

    async fn execute(
        &mut self,
        stmt: &Self::Prepared,
        params: &[RowValues],
    ) -> Result<usize, DriverError>;

    async fn query(
        &mut self,
        stmt: &Self::Prepared,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError>;

    async fn commit(self) -> Result<(), DriverError>;

    async fn rollback(self) -> Result<(), DriverError>;
}

/// The pool a [`Manager`](crate::Manager) prepares statements against and opens
/// transactions from.
#[async_trait]
pub trait ConnectionPool: Send + Sync + 'static {
    type Statement: PoolStatement;
    type Transaction: DbTransaction;

    async fn prepare(&self, query: &str) -> Result<Self::Statement, DriverError>;

    async fn begin(&self) -> Result<Self::Transaction, DriverError>;
}
