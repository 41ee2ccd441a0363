use std::sync::Arc;

use async_trait::async_trait;
use bb8::PooledConnection;

use crate::backend::DbTransaction;
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::config::SqliteManager;
use super::connection::{SharedSqliteConnection, run_blocking};
use super::params::Params;
use super::query::{build_result_set, execute_statement};

type OwnedSqliteConnection = PooledConnection<'static, SqliteManager>;

/// Transaction that owns its pooled `SQLite` connection until completion.
///
/// Dropping it without commit/rollback rolls back before the connection
/// returns to the pool.
pub struct SqliteTransaction {
    conn: Option<OwnedSqliteConnection>,
}

/// Statement prepared within a [`SqliteTransaction`].
#[derive(Debug, Clone)]
pub struct SqliteTxStatement {
    sql: Arc<str>,
}

impl SqliteTxStatement {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Issue `BEGIN` on a checked-out connection.
///
/// # Errors
/// Returns [`DriverError`] if the transaction cannot be started.
pub(crate) async fn begin_transaction(
    conn: OwnedSqliteConnection,
) -> Result<SqliteTransaction, DriverError> {
    run_blocking(Arc::clone(&*conn), |guard| {
        guard.execute_batch("BEGIN")?;
        Ok(())
    })
    .await?;
    Ok(SqliteTransaction { conn: Some(conn) })
}

impl SqliteTransaction {
    fn handle(&self) -> Result<SharedSqliteConnection, DriverError> {
        self.conn
            .as_ref()
            .map(|conn| Arc::clone(&**conn))
            .ok_or_else(|| DriverError::Other("SQLite transaction already completed".into()))
    }

    async fn finish(&mut self, sql: &'static str) -> Result<(), DriverError> {
        run_blocking(self.handle()?, move |guard| {
            guard.execute_batch(sql)?;
            Ok(())
        })
        .await?;
        // Only a finished transaction gives up its connection; otherwise Drop rolls back.
        self.conn = None;
        Ok(())
    }
}

#[async_trait]
impl DbTransaction for SqliteTransaction {
    type Prepared = SqliteTxStatement;

    async fn prepare(&mut self, query: &str) -> Result<SqliteTxStatement, DriverError> {
        let sql: Arc<str> = Arc::from(query);
        let sql_clone = Arc::clone(&sql);
        run_blocking(self.handle()?, move |guard| {
            guard.prepare_cached(&sql_clone)?;
            Ok(())
        })
        .await?;
        Ok(SqliteTxStatement { sql })
    }

    async fn execute(
        &mut self,
        stmt: &SqliteTxStatement,
        params: &[RowValues],
    ) -> Result<usize, DriverError> {
        let params_owned = Params::convert(params);
        let sql = Arc::clone(&stmt.sql);
        run_blocking(self.handle()?, move |guard| {
            let mut prepared = guard.prepare_cached(&sql)?;
            execute_statement(&mut prepared, params_owned.as_values())
        })
        .await
    }

    async fn query(
        &mut self,
        stmt: &SqliteTxStatement,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        let params_owned = Params::convert(params);
        let sql = Arc::clone(&stmt.sql);
        run_blocking(self.handle()?, move |guard| {
            let mut prepared = guard.prepare_cached(&sql)?;
            build_result_set(&mut prepared, params_owned.as_values())
        })
        .await
    }

    async fn commit(mut self) -> Result<(), DriverError> {
        self.finish("COMMIT").await
    }

    async fn rollback(mut self) -> Result<(), DriverError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let rolled_back = run_blocking(Arc::clone(&*conn), |guard| {
                    guard.execute_batch("ROLLBACK")?;
                    Ok(())
                })
                .await;
                if let Err(err) = rolled_back {
                    tracing::warn!(error = %err, "rollback of abandoned sqlite transaction failed");
                }
                drop(conn);
            });
        } else {
            let guard = conn.blocking_lock();
            if let Err(err) = guard.execute_batch("ROLLBACK") {
                tracing::warn!(error = %err, "rollback of abandoned sqlite transaction failed");
            }
        }
    }
}
