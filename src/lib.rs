//! Shared prepared-statement cache and savepoint-backed nested transactions
//! over a pooled SQL connection.
//!
//! A [`Manager`] owns the pool, the logger and the statement cache; it is
//! built once per application. Each logical unit of work takes a [`Handle`]
//! from it, runs statements, and controls its transaction:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_handle::prelude::*;
//! use sql_handle::sqlite::SqlitePool;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = SqlitePool::builder("app.db".into()).build().await?;
//! let manager = Manager::new(pool, Arc::new(TracingLogger));
//!
//! let mut h = manager.new_handle();
//! h.begin().await?;
//! h.exec("INSERT INTO users (name) VALUES (?1)", &["alice".into()]).await?;
//! h.quasi_begin().await?; // SAVEPOINT mrs_1
//! let outcome = h.exec("UPDATE users SET active = ?1", &[true.into()]).await;
//! h.quasi_commit_or_rollback(&outcome).await?; // RELEASE SAVEPOINT mrs_1
//! h.commit().await?;
//!
//! let (count,): (i64,) = h.query_row("SELECT COUNT(*) FROM users", &[]).await.scan()?;
//! # let _ = count;
//! # Ok(()) }
//! ```

pub mod backend;
pub mod cache;
pub mod error;
pub mod handle;
pub mod logger;
pub mod manager;
pub mod prelude;
pub mod results;
pub mod row;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use backend::{ConnectionPool, DbTransaction, PoolStatement};
pub use cache::{StatementCache, StatementStore};
pub use error::{DriverError, SqlHandleError, SqlHandleResult};
pub use handle::{Handle, HandleState, ResolvedStatement, SavepointStack};
pub use logger::{LogError, LogField, Logger, NopLogger, TracingLogger};
pub use manager::{DEFAULT_SAVEPOINT_PREFIX, Manager, ManagerOptions};
pub use results::{CustomDbRow, ResultSet};
pub use row::{FromRow, FromValue, Row};
pub use types::RowValues;
