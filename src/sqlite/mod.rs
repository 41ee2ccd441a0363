// SQLite backend - a bb8 pool of rusqlite connections implementing the pool,
// statement and transaction capabilities.
//
// - config: pool options, builder and the bb8 connection manager
// - connection: shared connection type and the blocking-call bridge
// - params: conversion from middleware values to SQLite values
// - query: result extraction and building
// - prepared: pool-bound statements
// - transaction: connection-owning transactions

pub mod config;
pub mod connection;
pub mod params;
pub mod prepared;
pub mod query;
pub mod transaction;

pub use config::{SqliteManager, SqliteOptions, SqliteOptionsBuilder, SqlitePool};
pub use connection::SharedSqliteConnection;
pub use prepared::SqliteStatement;
pub use query::{build_result_set, execute_statement};
pub use transaction::{SqliteTransaction, SqliteTxStatement};
