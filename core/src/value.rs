//! SQL value model shared by converters, the marshaller, and the store.
//!
//! [`SqlValue`] is the storage-side representation of a single column value,
//! [`RowValues`] is the key-value bag produced by write-marshalling, and
//! [`RowCursor`] abstracts "read a column of the current row by name" so the
//! marshaller can read from a store cursor and from a bag alike.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Storage class of a column, rendered verbatim into DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    /// Signed integer storage.
    Integer,
    /// Floating point storage.
    Real,
    /// Text storage; literals are single-quoted.
    Text,
    /// Raw bytes; literals use the `X'..'` form.
    Blob,
}

impl SqlType {
    /// Returns the keyword used in column definitions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }

    /// Renders a raw declared default (e.g. `x` or `42`) as a literal of
    /// this storage class: text is quoted, numbers are left bare.
    pub fn render_default(self, raw: &str) -> String {
        match self {
            Self::Text => quote_text(raw),
            Self::Blob => format!("X'{raw}'"),
            Self::Integer | Self::Real => raw.to_string(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single value as the store sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Byte value.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns `true` for [`SqlValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value as an SQL literal.
    ///
    /// Text is single-quoted with embedded quotes doubled, numbers are bare,
    /// and a missing value is the `NULL` keyword.
    ///
    /// # Examples
    ///
    /// ```
    /// use lensorm_core::SqlValue;
    ///
    /// assert_eq!(SqlValue::Text("O'Hara".into()).to_literal(), "'O''Hara'");
    /// assert_eq!(SqlValue::Integer(42).to_literal(), "42");
    /// assert_eq!(SqlValue::Real(0.0).to_literal(), "0.0");
    /// assert_eq!(SqlValue::Null.to_literal(), "NULL");
    /// ```
    pub fn to_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) if v.is_finite() => format!("{v:?}"),
            Self::Real(_) => "NULL".to_string(),
            Self::Text(v) => quote_text(v),
            Self::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

fn quote_text(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// Read access to one row of a result set, by column name.
///
/// Implemented by store cursors and by [`RowValues`]. A column the row does
/// not carry reads as [`SqlValue::Null`].
pub trait RowCursor {
    /// Returns the value stored under `column`.
    fn value(&self, column: &str) -> Result<SqlValue>;

    /// Returns `true` if `column` is absent or holds `NULL`.
    fn is_null(&self, column: &str) -> Result<bool> {
        Ok(self.value(column)?.is_null())
    }
}

/// Order-irrelevant mapping from column name to value.
///
/// Produced by write-marshalling and consumed by the statement builder.
/// Iteration is by column name so generated statements are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowValues {
    values: BTreeMap<String, SqlValue>,
}

impl RowValues {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `column`, replacing any previous value.
    pub fn put(&mut self, column: impl Into<String>, value: SqlValue) {
        self.values.insert(column.into(), value);
    }

    /// Returns the value stored under `column`.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// Removes and returns the value stored under `column`.
    pub fn remove(&mut self, column: &str) -> Option<SqlValue> {
        self.values.remove(column)
    }

    /// Returns `true` if a value is stored under `column`.
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Number of stored columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no column is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(column, value)` pairs in column-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl RowCursor for RowValues {
    fn value(&self, column: &str) -> Result<SqlValue> {
        Ok(self.values.get(column).cloned().unwrap_or(SqlValue::Null))
    }
}

impl FromIterator<(String, SqlValue)> for RowValues {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
