use std::sync::Arc;

use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns [`DriverError::Sqlite`] if the column cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, DriverError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Run a prepared statement and materialise every row into a [`ResultSet`].
///
/// # Errors
/// Returns [`DriverError`] if execution or value extraction fails.
pub fn build_result_set(
    stmt: &mut Statement<'_>,
    params: &[Value],
) -> Result<ResultSet, DriverError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows_iter = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Execute a statement for its effect.
///
/// Statements that produce result columns (`SELECT`, `... RETURNING`) are
/// stepped to completion and report the number of rows they produced;
/// everything else reports the rows changed.
///
/// # Errors
/// Returns [`DriverError`] if execution fails.
pub fn execute_statement(stmt: &mut Statement<'_>, params: &[Value]) -> Result<usize, DriverError> {
    if stmt.column_count() == 0 {
        return Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?);
    }
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut stepped = 0;
    while rows.next()?.is_some() {
        stepped += 1;
    }
    Ok(stepped)
}
