use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::DriverError;

/// A rusqlite connection shared between the pool and blocking worker threads.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// Run synchronous rusqlite work on the blocking thread pool.
///
/// # Errors
/// Whatever `func` returns, or [`DriverError::Connection`] if the blocking task panicked.
pub async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, DriverError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, DriverError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| DriverError::Connection(format!("sqlite spawn_blocking join error: {e}")))?
}
