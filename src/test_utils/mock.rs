use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{ConnectionPool, DbTransaction, PoolStatement};
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::RowValues;

#[derive(Debug, Default)]
struct MockState {
    journal: Vec<String>,
    fail_prepare: HashSet<String>,
    fail_exec: HashSet<String>,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
    results: HashMap<String, ResultSet>,
    prepare_delay: Option<Duration>,
}

/// Scripted pool recording every call in a journal.
///
/// Journal entries: `PREPARE q`, `EXEC q`, `QUERY q` for pool statements;
/// `BEGIN`, `TX PREPARE q`, `TX EXEC q`, `TX QUERY q`, `COMMIT`, `ROLLBACK`
/// for transactions. Clones share state, so a test can keep one clone for
/// inspection after handing another to a manager.
#[derive(Debug, Clone, Default)]
pub struct MockPool {
    state: Arc<Mutex<MockState>>,
    pool_prepares: Arc<AtomicUsize>,
}

impl MockPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, entry: String) {
        self.state().journal.push(entry);
    }

    #[must_use]
    pub fn journal(&self) -> Vec<String> {
        self.state().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    /// Statements run through a transaction (`TX EXEC`/`TX QUERY`), in order.
    #[must_use]
    pub fn tx_statements(&self) -> Vec<String> {
        self.journal()
            .iter()
            .filter_map(|entry| {
                entry
                    .strip_prefix("TX EXEC ")
                    .or_else(|| entry.strip_prefix("TX QUERY "))
                    .map(str::to_owned)
            })
            .collect()
    }

    /// Number of prepares served by the pool itself (not by transactions).
    #[must_use]
    pub fn pool_prepare_count(&self) -> usize {
        self.pool_prepares.load(Ordering::SeqCst)
    }

    /// Make every prepare of `query` (pool or transaction) fail.
    pub fn fail_prepare(&self, query: &str) {
        self.state().fail_prepare.insert(query.to_owned());
    }

    /// Make every execution of `query` fail.
    pub fn fail_exec(&self, query: &str) {
        self.state().fail_exec.insert(query.to_owned());
    }

    pub fn fail_begin(&self) {
        self.state().fail_begin = true;
    }

    pub fn fail_commit(&self) {
        self.state().fail_commit = true;
    }

    pub fn fail_rollback(&self) {
        self.state().fail_rollback = true;
    }

    /// Rows returned whenever `query` is run as a query. Executing it reports
    /// how many rows it holds.
    pub fn with_rows(&self, query: &str, rows: ResultSet) {
        self.state().results.insert(query.to_owned(), rows);
    }

    /// Delay every pool prepare, widening the window for concurrent misses.
    pub fn set_prepare_delay(&self, delay: Duration) {
        self.state().prepare_delay = Some(delay);
    }

    fn check_prepare(&self, query: &str) -> Result<(), DriverError> {
        if self.state().fail_prepare.contains(query) {
            return Err(DriverError::Other(format!("cannot prepare `{query}`")));
        }
        Ok(())
    }

    fn run(&self, kind: &str, query: &str) -> Result<(), DriverError> {
        self.record(format!("{kind} {query}"));
        if self.state().fail_exec.contains(query) {
            return Err(DriverError::Other(format!("cannot execute `{query}`")));
        }
        Ok(())
    }

    fn rows_for(&self, query: &str) -> ResultSet {
        self.state().results.get(query).cloned().unwrap_or_default()
    }

    /// Canned rows count as rows produced; anything else affects one row.
    fn exec_count(&self, query: &str) -> usize {
        self.state().results.get(query).map_or(1, ResultSet::len)
    }
}

/// Pool-bound mock statement. `id` tells apart separate preparations of one text.
#[derive(Debug)]
pub struct MockStatement {
    pool: MockPool,
    sql: String,
    id: usize,
}

impl MockStatement {
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl PoolStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, _params: &[RowValues]) -> Result<usize, DriverError> {
        self.pool.run("EXEC", &self.sql)?;
        Ok(self.pool.exec_count(&self.sql))
    }

    async fn query(&self, _params: &[RowValues]) -> Result<ResultSet, DriverError> {
        self.pool.run("QUERY", &self.sql)?;
        Ok(self.pool.rows_for(&self.sql))
    }
}

/// Mock transaction. Dropping it unfinished journals `ROLLBACK (dropped)`.
#[derive(Debug)]
pub struct MockTransaction {
    pool: MockPool,
    open: bool,
}

#[derive(Debug, Clone)]
pub struct MockTxStatement {
    sql: String,
}

#[async_trait]
impl DbTransaction for MockTransaction {
    type Prepared = MockTxStatement;

    async fn prepare(&mut self, query: &str) -> Result<MockTxStatement, DriverError> {
        self.pool.check_prepare(query)?;
        self.pool.record(format!("TX PREPARE {query}"));
        Ok(MockTxStatement {
            sql: query.to_owned(),
        })
    }

    async fn execute(
        &mut self,
        stmt: &MockTxStatement,
        _params: &[RowValues],
    ) -> Result<usize, DriverError> {
        self.pool.run("TX EXEC", &stmt.sql)?;
        Ok(self.pool.exec_count(&stmt.sql))
    }

    async fn query(
        &mut self,
        stmt: &MockTxStatement,
        _params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        self.pool.run("TX QUERY", &stmt.sql)?;
        Ok(self.pool.rows_for(&stmt.sql))
    }

    async fn commit(mut self) -> Result<(), DriverError> {
        self.open = false;
        self.pool.record("COMMIT".into());
        if self.pool.state().fail_commit {
            return Err(DriverError::Other("commit refused".into()));
        }
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), DriverError> {
        self.open = false;
        self.pool.record("ROLLBACK".into());
        if self.pool.state().fail_rollback {
            return Err(DriverError::Other("rollback refused".into()));
        }
        Ok(())
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        if self.open {
            self.pool.record("ROLLBACK (dropped)".into());
        }
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    type Statement = MockStatement;
    type Transaction = MockTransaction;

    async fn prepare(&self, query: &str) -> Result<MockStatement, DriverError> {
        let delay = self.state().prepare_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_prepare(query)?;
        let id = self.pool_prepares.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(format!("PREPARE {query}"));
        Ok(MockStatement {
            pool: self.clone(),
            sql: query.to_owned(),
            id,
        })
    }

    async fn begin(&self) -> Result<MockTransaction, DriverError> {
        if self.state().fail_begin {
            return Err(DriverError::Connection("begin refused".into()));
        }
        self.record("BEGIN".into());
        Ok(MockTransaction {
            pool: self.clone(),
            open: true,
        })
    }
}
