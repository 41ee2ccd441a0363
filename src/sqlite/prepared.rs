use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::PoolStatement;
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::config::{SqliteManager, checkout_error};
use super::connection::run_blocking;
use super::params::Params;
use super::query::{build_result_set, execute_statement};

/// Statement bound to the pool rather than to one connection.
///
/// Each execution checks out whichever connection is free and reuses that
/// connection's `prepare_cached` entry, compiling the text there on first use.
#[derive(Clone)]
pub struct SqliteStatement {
    pool: bb8::Pool<SqliteManager>,
    sql: Arc<str>,
}

impl fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

impl SqliteStatement {
    /// Compile `query` once on a pooled connection to validate it.
    pub(crate) async fn prepare(
        pool: bb8::Pool<SqliteManager>,
        query: &str,
    ) -> Result<Self, DriverError> {
        let sql: Arc<str> = Arc::from(query);
        {
            let conn = pool.get().await.map_err(checkout_error)?;
            let sql_clone = Arc::clone(&sql);
            run_blocking(Arc::clone(&*conn), move |guard| {
                guard.prepare_cached(&sql_clone)?;
                Ok(())
            })
            .await?;
        }
        Ok(Self { pool, sql })
    }
}

#[async_trait]
impl PoolStatement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, params: &[RowValues]) -> Result<usize, DriverError> {
        let params_owned = Params::convert(params);
        let sql = Arc::clone(&self.sql);
        let conn = self.pool.get().await.map_err(checkout_error)?;
        run_blocking(Arc::clone(&*conn), move |guard| {
            let mut stmt = guard.prepare_cached(&sql)?;
            execute_statement(&mut stmt, params_owned.as_values())
        })
        .await
    }

    async fn query(&self, params: &[RowValues]) -> Result<ResultSet, DriverError> {
        let params_owned = Params::convert(params);
        let sql = Arc::clone(&self.sql);
        let conn = self.pool.get().await.map_err(checkout_error)?;
        run_blocking(Arc::clone(&*conn), move |guard| {
            let mut stmt = guard.prepare_cached(&sql)?;
            build_result_set(&mut stmt, params_owned.as_values())
        })
        .await
    }
}
