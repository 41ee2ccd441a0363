use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backend::ConnectionPool;
use crate::error::{DriverError, SqlHandleError};

use super::connection::{SharedSqliteConnection, run_blocking};
use super::prepared::SqliteStatement;
use super::transaction::{SqliteTransaction, begin_transaction};

/// Options for configuring a `SQLite` pool.
///
/// Every pooled connection opens `db_path` separately, so `:memory:` gives each
/// connection its own database; use a file (or a shared-cache URI) for anything
/// that spans connections.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub max_size: u32,
    pub busy_timeout: Duration,
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            max_size: 4,
            busy_timeout: Duration::from_secs(5),
            wal: true,
        }
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn max_size(mut self, max_size: u32) -> Self {
        self.opts.max_size = max_size;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build the pool.
    ///
    /// # Errors
    /// Returns [`SqlHandleError::Config`] if the pool cannot be created.
    pub async fn build(self) -> Result<SqlitePool, SqlHandleError> {
        SqlitePool::connect(self.finish()).await
    }
}

/// bb8 connection manager opening rusqlite connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    opts: SqliteOptions,
}

impl SqliteManager {
    #[must_use]
    pub fn new(opts: SqliteOptions) -> Self {
        Self { opts }
    }
}

impl bb8::ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = DriverError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let opts = self.opts.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<_, DriverError> {
            let conn = rusqlite::Connection::open(&opts.db_path)?;
            conn.busy_timeout(opts.busy_timeout)?;
            if opts.wal {
                let _mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    "WAL",
                    |row| row.get(0),
                )?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| DriverError::Connection(format!("sqlite open join error: {e}")))??;
        Ok(Arc::new(Mutex::new(conn)))
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        run_blocking(Arc::clone(conn), |guard| {
            guard.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        // A connection handed back mid-transaction must not be reused.
        conn.try_lock().is_ok_and(|guard| !guard.is_autocommit())
    }
}

pub(crate) fn checkout_error(err: bb8::RunError<DriverError>) -> DriverError {
    match err {
        bb8::RunError::User(e) => e,
        bb8::RunError::TimedOut => {
            DriverError::Pool("timed out waiting for a sqlite connection".into())
        }
    }
}

/// A pool of `SQLite` connections usable as a [`ConnectionPool`].
#[derive(Clone)]
pub struct SqlitePool {
    pool: bb8::Pool<SqliteManager>,
    opts: SqliteOptions,
}

impl fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlitePool")
            .field("opts", &self.opts)
            .field("state", &self.pool.state())
            .finish()
    }
}

impl SqlitePool {
    #[must_use]
    pub fn builder(db_path: String) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// Create the pool and open its first connection.
    ///
    /// # Errors
    /// Returns [`SqlHandleError::Config`] if the database cannot be opened.
    pub async fn connect(opts: SqliteOptions) -> Result<Self, SqlHandleError> {
        let pool = bb8::Pool::builder()
            .max_size(opts.max_size)
            .build(SqliteManager::new(opts.clone()))
            .await
            .map_err(|e| SqlHandleError::Config(format!("Failed to create SQLite pool: {e}")))?;
        tracing::debug!(db_path = %opts.db_path, max_size = opts.max_size, "sqlite pool ready");
        Ok(Self { pool, opts })
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.opts
    }

    #[must_use]
    pub fn inner(&self) -> &bb8::Pool<SqliteManager> {
        &self.pool
    }

    /// Run a batch of statements outside any handle, e.g. to create a schema.
    ///
    /// # Errors
    /// Returns [`DriverError`] if checkout or execution fails.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DriverError> {
        let conn = self.pool.get().await.map_err(checkout_error)?;
        let sql_owned = sql.to_owned();
        run_blocking(Arc::clone(&*conn), move |guard| {
            guard.execute_batch(&sql_owned)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ConnectionPool for SqlitePool {
    type Statement = SqliteStatement;
    type Transaction = SqliteTransaction;

    async fn prepare(&self, query: &str) -> Result<SqliteStatement, DriverError> {
        SqliteStatement::prepare(self.pool.clone(), query).await
    }

    async fn begin(&self) -> Result<SqliteTransaction, DriverError> {
        let conn = self.pool.get_owned().await.map_err(checkout_error)?;
        begin_transaction(conn).await
    }
}
