use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::{SqlHandleError, SqlHandleResult};
use crate::results::{CustomDbRow, ResultSet};
use crate::types::RowValues;

/// Result of [`Handle::query_row`](crate::Handle::query_row): either the first
/// row or the error captured while resolving or running the query.
///
/// Errors are only reported by [`Row::scan`], so callers can chain
/// `h.query_row(..).await.scan::<(i64, String)>()` and handle one error site.
#[derive(Debug)]
pub struct Row {
    inner: SqlHandleResult<CustomDbRow>,
}

impl Row {
    pub(crate) fn from_result(outcome: SqlHandleResult<ResultSet>) -> Self {
        Self {
            inner: outcome.and_then(|rs| rs.into_first().ok_or(SqlHandleError::NoRows)),
        }
    }

    /// Decode the row.
    ///
    /// # Errors
    /// The deferred query error, [`SqlHandleError::NoRows`], or a decode error.
    pub fn scan<T: FromRow>(self) -> SqlHandleResult<T> {
        let row = self.inner?;
        T::from_row(&row)
    }

    /// Decode into an existing destination, which is left untouched on any error.
    ///
    /// # Errors
    /// Same as [`Row::scan`].
    pub fn scan_into<T: FromRow>(self, dest: &mut T) -> SqlHandleResult<()> {
        *dest = self.scan()?;
        Ok(())
    }

    /// The deferred error, if any.
    #[must_use]
    pub fn err(&self) -> Option<&SqlHandleError> {
        self.inner.as_ref().err()
    }

    /// Give up deferral and take the raw outcome.
    ///
    /// # Errors
    /// The deferred error.
    pub fn into_result(self) -> SqlHandleResult<CustomDbRow> {
        self.inner
    }
}

/// Conversion from one column value.
pub trait FromValue: Sized {
    /// # Errors
    /// A human-readable reason when the value has the wrong shape.
    fn from_value(value: &RowValues) -> Result<Self, String>;
}

fn mismatch<T>(value: &RowValues) -> String {
    format!("expected {}, found {value:?}", std::any::type_name::<T>())
}

impl FromValue for RowValues {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value.as_int().copied().ok_or_else(|| mismatch::<i64>(value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|e| format!("{wide} out of range for i32: {e}"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value.as_float().ok_or_else(|| mismatch::<f64>(value))
    }
}

impl FromValue for bool {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value.as_bool().ok_or_else(|| mismatch::<bool>(value))
    }
}

impl FromValue for String {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value
            .as_text()
            .map(str::to_owned)
            .ok_or_else(|| mismatch::<String>(value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value
            .as_blob()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch::<Vec<u8>>(value))
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value
            .as_timestamp()
            .ok_or_else(|| mismatch::<NaiveDateTime>(value))
    }
}

impl FromValue for JsonValue {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        match value {
            RowValues::JSON(json) => Ok(json.clone()),
            RowValues::Text(text) => serde_json::from_str(text).map_err(|e| e.to_string()),
            other => Err(mismatch::<JsonValue>(other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// Conversion from a whole row.
pub trait FromRow: Sized {
    /// # Errors
    /// Column count or decode errors.
    fn from_row(row: &CustomDbRow) -> SqlHandleResult<Self>;
}

impl FromRow for CustomDbRow {
    fn from_row(row: &CustomDbRow) -> SqlHandleResult<Self> {
        Ok(row.clone())
    }
}

fn column<T: FromValue>(row: &CustomDbRow, column: usize) -> SqlHandleResult<T> {
    let value = row.get_by_index(column).ok_or(SqlHandleError::ColumnCount {
        expected: column + 1,
        actual: row.len(),
    })?;
    T::from_value(value).map_err(|message| SqlHandleError::Decode { column, message })
}

macro_rules! impl_from_row_tuple {
    ($count:expr; $($idx:tt => $T:ident),+) => {
        impl<$($T: FromValue),+> FromRow for ($($T,)+) {
            fn from_row(row: &CustomDbRow) -> SqlHandleResult<Self> {
                if row.len() != $count {
                    return Err(SqlHandleError::ColumnCount {
                        expected: $count,
                        actual: row.len(),
                    });
                }
                Ok(($(column::<$T>(row, $idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(1; 0 => A);
impl_from_row_tuple!(2; 0 => A, 1 => B);
impl_from_row_tuple!(3; 0 => A, 1 => B, 2 => C);
impl_from_row_tuple!(4; 0 => A, 1 => B, 2 => C, 3 => D);
impl_from_row_tuple!(5; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_from_row_tuple!(6; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F);
