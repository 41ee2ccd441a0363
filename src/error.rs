use thiserror::Error;

/// Errors reported by a connection pool, statement or transaction backend.
///
/// The core never inspects these; they travel as the `source` of a [`SqlHandleError`].
#[derive(Debug, Error)]
pub enum DriverError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Other driver error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum SqlHandleError {
    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("transaction already active")]
    TransactionAlreadyActive,

    #[error("{depth} savepoint(s) still open; release or roll them back first")]
    OpenSavepoints { depth: usize },

    #[error("there are no savepoints")]
    NoSavepoints,

    #[error("statement preparation failed for `{query}`: {source}")]
    StatementPreparationFailed {
        query: String,
        #[source]
        source: DriverError,
    },

    #[error("begin failed: {0}")]
    TransactionBeginFailed(#[source] DriverError),

    #[error("commit failed: {0}")]
    CommitFailed(#[source] DriverError),

    #[error("rollback failed: {0}")]
    RollbackFailed(#[source] DriverError),

    #[error("execution failed for `{query}`: {source}")]
    ExecutionFailed {
        query: String,
        #[source]
        source: DriverError,
    },

    #[error("query returned no rows")]
    NoRows,

    #[error("expected {expected} column(s), row has {actual}")]
    ColumnCount { expected: usize, actual: usize },

    #[error("cannot decode column {column}: {message}")]
    Decode { column: usize, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SqlHandleError {
    pub(crate) fn preparation(query: &str, source: DriverError) -> Self {
        Self::StatementPreparationFailed {
            query: query.to_owned(),
            source,
        }
    }

    pub(crate) fn execution(query: &str, source: DriverError) -> Self {
        Self::ExecutionFailed {
            query: query.to_owned(),
            source,
        }
    }

    /// The query text attached to this error, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::StatementPreparationFailed { query, .. }
            | Self::ExecutionFailed { query, .. } => Some(query.as_str()),
            _ => None,
        }
    }
}

pub type SqlHandleResult<T> = Result<T, SqlHandleError>;
