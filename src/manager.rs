use std::sync::Arc;

use crate::backend::ConnectionPool;
use crate::cache::{StatementCache, StatementStore};
use crate::error::{SqlHandleError, SqlHandleResult};
use crate::handle::Handle;
use crate::logger::Logger;

/// Savepoint prefix used when none is configured.
pub const DEFAULT_SAVEPOINT_PREFIX: &str = "mrs";

/// Options for a [`Manager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Savepoints are named `<prefix>_<depth>`.
    pub savepoint_prefix: String,
}

impl ManagerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            savepoint_prefix: DEFAULT_SAVEPOINT_PREFIX.to_owned(),
        }
    }

    #[must_use]
    pub fn with_savepoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.savepoint_prefix = prefix.into();
        self
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Application-wide owner of the pool, the logger and the shared statement cache.
///
/// Construct one per application, wrap it in an [`Arc`] and hand out
/// [`Handle`]s from it, one per logical unit of work.
pub struct Manager<P: ConnectionPool> {
    pool: P,
    logger: Arc<dyn Logger>,
    stmts: Box<dyn StatementStore<P::Statement>>,
    options: ManagerOptions,
}

impl<P: ConnectionPool> Manager<P> {
    pub fn new(pool: P, logger: Arc<dyn Logger>) -> Arc<Self> {
        Self::with_options(pool, logger, ManagerOptions::default())
    }

    pub fn with_options(pool: P, logger: Arc<dyn Logger>, options: ManagerOptions) -> Arc<Self> {
        Self::with_store(pool, logger, options, StatementCache::new())
    }

    /// Use a custom statement store instead of the unbounded default.
    pub fn with_store<S>(
        pool: P,
        logger: Arc<dyn Logger>,
        options: ManagerOptions,
        store: S,
    ) -> Arc<Self>
    where
        S: StatementStore<P::Statement> + 'static,
    {
        Arc::new(Self {
            pool,
            logger,
            stmts: Box::new(store),
            options,
        })
    }

    /// A fresh handle: no transaction, empty savepoint stack. Performs no I/O.
    #[must_use]
    pub fn new_handle(self: &Arc<Self>) -> Handle<P> {
        Handle::new(Arc::clone(self))
    }

    /// Return the cached statement for `query`, preparing and caching it on a miss.
    ///
    /// Concurrent first-time resolution of the same text may prepare more than
    /// once; the last statement stored wins and every returned statement is valid.
    ///
    /// # Errors
    /// Returns [`SqlHandleError::StatementPreparationFailed`] if the pool rejects the query.
    pub async fn resolve_statement(&self, query: &str) -> SqlHandleResult<Arc<P::Statement>> {
        if let Some(stmt) = self.stmts.get(query) {
            return Ok(stmt);
        }
        tracing::trace!(query, "statement cache miss");
        let stmt = Arc::new(
            self.pool
                .prepare(query)
                .await
                .map_err(|e| SqlHandleError::preparation(query, e))?,
        );
        self.stmts.put(query, Arc::clone(&stmt));
        Ok(stmt)
    }

    #[must_use]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    #[must_use]
    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Number of distinct query texts currently cached.
    #[must_use]
    pub fn cached_statements(&self) -> usize {
        self.stmts.len()
    }
}

impl<P: ConnectionPool> std::fmt::Debug for Manager<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("cached_statements", &self.stmts.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
