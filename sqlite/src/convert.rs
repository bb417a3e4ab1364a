//! Conversion between lensorm SQL values and rusqlite values.

use lensorm_core::{Error as CoreError, RowCursor, SqlValue};
use rusqlite::Row;
use rusqlite::types::{Value, ValueRef};

/// Converts a borrowed SQLite value into an owned [`SqlValue`].
///
/// Text that is not valid UTF-8 is decoded lossily.
pub(crate) fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

/// Converts a [`SqlValue`] into a bindable rusqlite value.
pub(crate) fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Blob(v) => Value::Blob(v.clone()),
    }
}

/// Exposes the current row of a rusqlite result set to the row marshaller.
///
/// A column the result set does not carry reads as `NULL`, matching
/// [`RowValues`](lensorm_core::RowValues).
pub struct SqliteRow<'r, 's> {
    row: &'r Row<'s>,
}

impl<'r, 's> SqliteRow<'r, 's> {
    /// Wraps a rusqlite row.
    pub fn new(row: &'r Row<'s>) -> Self {
        Self { row }
    }
}

impl RowCursor for SqliteRow<'_, '_> {
    fn value(&self, column: &str) -> lensorm_core::Result<SqlValue> {
        match self.row.get_ref(column) {
            Ok(value) => Ok(from_value_ref(value)),
            Err(rusqlite::Error::InvalidColumnName(_)) => Ok(SqlValue::Null),
            Err(e) => Err(CoreError::conversion(column, e.to_string())),
        }
    }
}
