//! The single-owner unit of work: statement resolution plus a transaction
//! state machine that emulates nested transactions with savepoints.
//!
//! A [`Handle`] starts `Idle`. [`Handle::begin`] opens a real transaction;
//! while one is open, [`Handle::quasi_begin`] pushes a savepoint instead, so an
//! inner unit of work can begin/commit/rollback as if it owned a transaction:
//!
//! ```rust,no_run
//! use sql_handle::prelude::*;
//!
//! async fn add_tag<P: ConnectionPool>(h: &mut Handle<P>, tag: &str) -> SqlHandleResult<()> {
//!     h.quasi_begin().await?;
//!     let outcome = h
//!         .exec("INSERT INTO tags (name) VALUES (?1)", &[tag.into()])
//!         .await;
//!     h.quasi_commit_or_rollback(&outcome).await?;
//!     outcome.map(|_| ())
//! }
//! ```

use std::sync::Arc;

use crate::backend::{ConnectionPool, DbTransaction, PoolStatement};
use crate::error::{SqlHandleError, SqlHandleResult};
use crate::logger::OpTimer;
use crate::manager::Manager;
use crate::results::ResultSet;
use crate::row::Row;
use crate::types::RowValues;

type TxPrepared<P> = <<P as ConnectionPool>::Transaction as DbTransaction>::Prepared;

/// Ordered savepoint names, innermost last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavepointStack {
    names: Vec<String>,
}

impl SavepointStack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: Vec::with_capacity(3),
        }
    }

    /// Name the next push would receive: `<prefix>_<depth after push>`.
    #[must_use]
    pub fn next_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.names.len() + 1)
    }

    pub fn push(&mut self, name: String) {
        self.names.push(name);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.names.pop()
    }

    #[must_use]
    pub fn top(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

enum TxState<T> {
    Idle,
    InTransaction { tx: T, savepoints: SavepointStack },
}

/// Observable state of a [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Idle,
    /// `depth` is the number of open savepoints; `0` for a top-level transaction.
    InTransaction { depth: usize },
}

/// A statement resolved for one call.
pub enum ResolvedStatement<P: ConnectionPool> {
    /// Pool-bound statement taken from (or just added to) the shared cache.
    Cached(Arc<P::Statement>),
    /// Prepared through the open transaction; never cached.
    Transactional { sql: String, prepared: TxPrepared<P> },
}

impl<P: ConnectionPool> ResolvedStatement<P> {
    #[must_use]
    pub fn sql(&self) -> &str {
        match self {
            Self::Cached(stmt) => stmt.sql(),
            Self::Transactional { sql, .. } => sql,
        }
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}

/// One logical, sequential unit of work. Not meant to be shared between tasks.
pub struct Handle<P: ConnectionPool> {
    manager: Arc<Manager<P>>,
    state: TxState<P::Transaction>,
}

impl<P: ConnectionPool> Handle<P> {
    pub(crate) fn new(manager: Arc<Manager<P>>) -> Self {
        Self {
            manager,
            state: TxState::Idle,
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<Manager<P>> {
        &self.manager
    }

    #[must_use]
    pub fn state(&self) -> HandleState {
        match &self.state {
            TxState::Idle => HandleState::Idle,
            TxState::InTransaction { savepoints, .. } => HandleState::InTransaction {
                depth: savepoints.len(),
            },
        }
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        matches!(self.state, TxState::InTransaction { .. })
    }

    #[must_use]
    pub fn savepoint_depth(&self) -> usize {
        match &self.state {
            TxState::Idle => 0,
            TxState::InTransaction { savepoints, .. } => savepoints.len(),
        }
    }

    /// Open savepoint names, outermost first. Empty when idle.
    #[must_use]
    pub fn savepoints(&self) -> &[String] {
        match &self.state {
            TxState::Idle => &[],
            TxState::InTransaction { savepoints, .. } => savepoints.names(),
        }
    }

    /// Open a real transaction.
    ///
    /// # Errors
    /// [`SqlHandleError::TransactionAlreadyActive`] when not idle,
    /// [`SqlHandleError::TransactionBeginFailed`] when the pool refuses.
    pub async fn begin(&mut self) -> SqlHandleResult<()> {
        if self.in_transaction() {
            return Err(SqlHandleError::TransactionAlreadyActive);
        }
        let tx = self
            .manager
            .pool()
            .begin()
            .await
            .map_err(SqlHandleError::TransactionBeginFailed)?;
        self.state = TxState::InTransaction {
            tx,
            savepoints: SavepointStack::new(),
        };
        tracing::debug!("transaction started");
        Ok(())
    }

    /// Commit the top-level transaction.
    ///
    /// The handle is idle afterwards even if the commit fails; the backend
    /// discards a transaction whose commit did not go through.
    ///
    /// # Errors
    /// [`SqlHandleError::NoActiveTransaction`], [`SqlHandleError::OpenSavepoints`]
    /// or [`SqlHandleError::CommitFailed`].
    pub async fn commit(&mut self) -> SqlHandleResult<()> {
        let tx = self.take_transaction()?;
        tx.commit().await.map_err(SqlHandleError::CommitFailed)?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Roll back the top-level transaction.
    ///
    /// # Errors
    /// [`SqlHandleError::NoActiveTransaction`], [`SqlHandleError::OpenSavepoints`]
    /// or [`SqlHandleError::RollbackFailed`].
    pub async fn rollback(&mut self) -> SqlHandleResult<()> {
        let tx = self.take_transaction()?;
        tx.rollback().await.map_err(SqlHandleError::RollbackFailed)?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    /// Roll back when `outcome` is an error, commit otherwise.
    ///
    /// # Errors
    /// Whatever [`Handle::commit`] or [`Handle::rollback`] returns.
    pub async fn commit_or_rollback<T, E>(
        &mut self,
        outcome: &Result<T, E>,
    ) -> SqlHandleResult<()> {
        if outcome.is_err() {
            self.rollback().await
        } else {
            self.commit().await
        }
    }

    /// Begin a transaction when idle, otherwise push a savepoint.
    ///
    /// # Errors
    /// See [`Handle::begin`] and [`Handle::savepoint`].
    pub async fn quasi_begin(&mut self) -> SqlHandleResult<()> {
        if self.in_transaction() {
            self.savepoint().await
        } else {
            self.begin().await
        }
    }

    /// Release the innermost savepoint, or commit when none is open.
    ///
    /// # Errors
    /// See [`Handle::commit`] and [`Handle::release_savepoint`].
    pub async fn quasi_commit(&mut self) -> SqlHandleResult<()> {
        if self.savepoint_depth() == 0 {
            self.commit().await
        } else {
            self.release_savepoint().await
        }
    }

    /// Roll back to the innermost savepoint, or roll back the transaction when none is open.
    ///
    /// # Errors
    /// See [`Handle::rollback`] and [`Handle::rollback_savepoint`].
    pub async fn quasi_rollback(&mut self) -> SqlHandleResult<()> {
        if self.savepoint_depth() == 0 {
            self.rollback().await
        } else {
            self.rollback_savepoint().await
        }
    }

    /// The single cleanup call at a unit of work's exit: any `Err` reverts,
    /// `Ok` keeps, regardless of what the error says.
    ///
    /// # Errors
    /// See [`Handle::quasi_commit`] and [`Handle::quasi_rollback`].
    pub async fn quasi_commit_or_rollback<T, E>(
        &mut self,
        outcome: &Result<T, E>,
    ) -> SqlHandleResult<()> {
        if outcome.is_err() {
            self.quasi_rollback().await
        } else {
            self.quasi_commit().await
        }
    }

    /// Issue `SAVEPOINT <prefix>_<depth>` inside the open transaction.
    ///
    /// # Errors
    /// [`SqlHandleError::NoActiveTransaction`] when idle, or the execution error.
    pub async fn savepoint(&mut self) -> SqlHandleResult<()> {
        let name = match &self.state {
            TxState::Idle => return Err(SqlHandleError::NoActiveTransaction),
            TxState::InTransaction { savepoints, .. } => {
                savepoints.next_name(&self.manager.options().savepoint_prefix)
            }
        };
        self.exec(&format!("SAVEPOINT {name}"), &[]).await?;
        tracing::debug!(savepoint = %name, "savepoint created");
        self.savepoints_mut()?.push(name);
        Ok(())
    }

    /// Issue `RELEASE SAVEPOINT` for the innermost savepoint and pop it.
    ///
    /// # Errors
    /// [`SqlHandleError::NoActiveTransaction`], [`SqlHandleError::NoSavepoints`]
    /// (no SQL issued), or the execution error (stack left untouched).
    pub async fn release_savepoint(&mut self) -> SqlHandleResult<()> {
        let name = self.top_savepoint()?;
        self.exec(&format!("RELEASE SAVEPOINT {name}"), &[]).await?;
        tracing::debug!(savepoint = %name, "savepoint released");
        self.savepoints_mut()?.pop();
        Ok(())
    }

    /// Issue `ROLLBACK TO SAVEPOINT` for the innermost savepoint and pop it.
    ///
    /// # Errors
    /// [`SqlHandleError::NoActiveTransaction`], [`SqlHandleError::NoSavepoints`]
    /// (no SQL issued), or the execution error (stack left untouched).
    pub async fn rollback_savepoint(&mut self) -> SqlHandleResult<()> {
        let name = self.top_savepoint()?;
        self.exec(&format!("ROLLBACK TO SAVEPOINT {name}"), &[]).await?;
        tracing::debug!(savepoint = %name, "rolled back to savepoint");
        self.savepoints_mut()?.pop();
        Ok(())
    }

    /// Prepare `query` against the pool, bypassing the shared cache.
    ///
    /// # Errors
    /// [`SqlHandleError::StatementPreparationFailed`].
    pub async fn prepare(&self, query: &str) -> SqlHandleResult<P::Statement> {
        self.manager
            .pool()
            .prepare(query)
            .await
            .map_err(|e| SqlHandleError::preparation(query, e))
    }

    /// Resolve `query` through the open transaction, or through the shared cache when idle.
    ///
    /// # Errors
    /// [`SqlHandleError::StatementPreparationFailed`].
    pub async fn statement_for(&mut self, query: &str) -> SqlHandleResult<ResolvedStatement<P>> {
        match &mut self.state {
            TxState::InTransaction { tx, .. } => {
                let prepared = tx
                    .prepare(query)
                    .await
                    .map_err(|e| SqlHandleError::preparation(query, e))?;
                Ok(ResolvedStatement::Transactional {
                    sql: query.to_owned(),
                    prepared,
                })
            }
            TxState::Idle => Ok(ResolvedStatement::Cached(
                self.manager.resolve_statement(query).await?,
            )),
        }
    }

    /// Execute a statement, returning the number of rows affected.
    ///
    /// A statement that yields rows is stepped to completion and reports how
    /// many it produced.
    ///
    /// # Errors
    /// Preparation or [`SqlHandleError::ExecutionFailed`] errors.
    pub async fn exec(&mut self, query: &str, params: &[RowValues]) -> SqlHandleResult<usize> {
        let manager = Arc::clone(&self.manager);
        let mut timer = OpTimer::start(manager.logger(), "exec", query, params);
        let outcome = self.run_exec(query, params).await;
        timer.finish(&outcome);
        outcome
    }

    /// Run a query and return every row.
    ///
    /// # Errors
    /// Preparation or [`SqlHandleError::ExecutionFailed`] errors.
    pub async fn query(&mut self, query: &str, params: &[RowValues]) -> SqlHandleResult<ResultSet> {
        let manager = Arc::clone(&self.manager);
        let mut timer = OpTimer::start(manager.logger(), "query", query, params);
        let outcome = self.run_query(query, params).await;
        timer.finish(&outcome);
        outcome
    }

    /// Run a query expected to return one row. Never fails here: any error,
    /// including an empty result, surfaces from [`Row::scan`].
    pub async fn query_row(&mut self, query: &str, params: &[RowValues]) -> Row {
        let manager = Arc::clone(&self.manager);
        let mut timer = OpTimer::start(manager.logger(), "query_row", query, params);
        let outcome = self.run_query(query, params).await;
        timer.finish(&outcome);
        Row::from_result(outcome)
    }

    async fn run_exec(&mut self, query: &str, params: &[RowValues]) -> SqlHandleResult<usize> {
        match self.statement_for(query).await? {
            ResolvedStatement::Cached(stmt) => stmt
                .execute(params)
                .await
                .map_err(|e| SqlHandleError::execution(query, e)),
            ResolvedStatement::Transactional { prepared, .. } => self
                .transaction_mut()?
                .execute(&prepared, params)
                .await
                .map_err(|e| SqlHandleError::execution(query, e)),
        }
    }

    async fn run_query(&mut self, query: &str, params: &[RowValues]) -> SqlHandleResult<ResultSet> {
        match self.statement_for(query).await? {
            ResolvedStatement::Cached(stmt) => stmt
                .query(params)
                .await
                .map_err(|e| SqlHandleError::execution(query, e)),
            ResolvedStatement::Transactional { prepared, .. } => self
                .transaction_mut()?
                .query(&prepared, params)
                .await
                .map_err(|e| SqlHandleError::execution(query, e)),
        }
    }

    fn transaction_mut(&mut self) -> SqlHandleResult<&mut P::Transaction> {
        match &mut self.state {
            TxState::InTransaction { tx, .. } => Ok(tx),
            TxState::Idle => Err(SqlHandleError::NoActiveTransaction),
        }
    }

    fn savepoints_mut(&mut self) -> SqlHandleResult<&mut SavepointStack> {
        match &mut self.state {
            TxState::InTransaction { savepoints, .. } => Ok(savepoints),
            TxState::Idle => Err(SqlHandleError::NoActiveTransaction),
        }
    }

    fn top_savepoint(&self) -> SqlHandleResult<String> {
        match &self.state {
            TxState::Idle => Err(SqlHandleError::NoActiveTransaction),
            TxState::InTransaction { savepoints, .. } => savepoints
                .top()
                .map(str::to_owned)
                .ok_or(SqlHandleError::NoSavepoints),
        }
    }

    /// Move the transaction out, leaving the handle idle. Only valid with no open savepoints.
    fn take_transaction(&mut self) -> SqlHandleResult<P::Transaction> {
        match &self.state {
            TxState::Idle => return Err(SqlHandleError::NoActiveTransaction),
            TxState::InTransaction { savepoints, .. } if !savepoints.is_empty() => {
                return Err(SqlHandleError::OpenSavepoints {
                    depth: savepoints.len(),
                });
            }
            TxState::InTransaction { .. } => {}
        }
        match std::mem::replace(&mut self.state, TxState::Idle) {
            TxState::InTransaction { tx, .. } => Ok(tx),
            TxState::Idle => Err(SqlHandleError::NoActiveTransaction),
        }
    }
}

impl<P: ConnectionPool> Drop for Handle<P> {
    fn drop(&mut self) {
        if let TxState::InTransaction { savepoints, .. } = &self.state {
            tracing::warn!(
                depth = savepoints.len(),
                "handle dropped with an open transaction; it will be rolled back"
            );
        }
    }
}

impl<P: ConnectionPool> std::fmt::Debug for Handle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("state", &self.state())
            .field("savepoints", &self.savepoints())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savepoint_names_follow_depth() {
        let mut stack = SavepointStack::new();
        assert_eq!(stack.next_name("mrs"), "mrs_1");
        stack.push(stack.next_name("mrs"));
        stack.push(stack.next_name("mrs"));
        assert_eq!(stack.names(), ["mrs_1", "mrs_2"]);
        assert_eq!(stack.top(), Some("mrs_2"));
        assert_eq!(stack.pop().as_deref(), Some("mrs_2"));
        // Depth, not a running counter, drives the name.
        assert_eq!(stack.next_name("mrs"), "mrs_2");
        assert_eq!(stack.next_name("app"), "app_2");
    }

    #[test]
    fn empty_stack_has_no_top() {
        let mut stack = SavepointStack::default();
        assert!(stack.is_empty());
        assert_eq!(stack.top(), None);
        assert_eq!(stack.pop(), None);
    }
}
