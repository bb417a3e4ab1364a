//! Type converters ("lenses") between Rust field values and SQL values.
//!
//! A [`Lens`] knows a column's [`SqlType`], its non-null default, how to
//! encode a field value into a [`SqlValue`], and how to decode one back.
//! Field values travel type-erased as `&dyn Any` / `Box<dyn Any>`; every
//! lens downcasts to exactly one Rust type.
//!
//! # Built-in lenses
//!
//! | Rust type | Lens | SQL type | default |
//! |---|---|---|---|
//! | `bool` | [`Lens::Bool`] | `INTEGER` (0/1) | `0` |
//! | `i8` .. `i64` | [`Lens::I8`] .. [`Lens::I64`] | `INTEGER` | `0` |
//! | `f32`, `f64` | [`Lens::F32`], [`Lens::F64`] | `REAL` | `0.0` |
//! | `char` | [`Lens::Char`] | `INTEGER` (code point) | `0` |
//! | `String` | [`Lens::Text`] | `TEXT` | `''` |
//! | `DateTime<Utc>` | [`Lens::DateTime`] | `INTEGER` (epoch millis) | `0` |
//! | `NaiveDateTime` | [`Lens::NaiveDateTime`] | `INTEGER` (epoch millis) | `0` |
//! | `NaiveDate` | [`Lens::Date`] | `INTEGER` (epoch days) | `0` |
//! | `Vec<String>` | [`Lens::StringList`] | `TEXT` (delimited) | `''` |
//!
//! Every scalar also has a nullable variant for `Option<T>` whose default is
//! absent: an unset value is stored as `NULL`, never as zero.
//!
//! # Lossy conversions
//!
//! - Timestamps are truncated to whole milliseconds.
//! - String lists are joined with the lens delimiter. A member containing
//!   the delimiter splits on read, and both `vec![]` and `vec![""]` are
//!   stored as `''` and read back as `vec![]`. Keeping the delimiter out of
//!   the data is the caller's responsibility.
//! - Reading `NULL` through a non-nullable lens yields the lens default.

use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Error, Result};
use crate::value::{RowCursor, RowValues, SqlType, SqlValue};

/// Delimiter used by [`Lens::LIST`].
pub const LIST_DELIMITER: char = ',';

/// ASCII unit separator, used by [`Lens::UNIT_SEPARATED_LIST`].
pub const UNIT_SEPARATOR: char = '\u{1f}';

/// A Rust value that maps onto one SQL column.
///
/// Implemented for the scalar types that have built-in lenses and for
/// `Option<T>` of each of them.
pub trait ColumnValue: Sized + 'static {
    /// Encodes the value for storage.
    fn to_sql(&self) -> SqlValue;

    /// Decodes a stored value.
    fn from_sql(value: SqlValue) -> std::result::Result<Self, String>;
}

fn mismatch<T>(value: &SqlValue) -> String {
    format!("cannot read {value:?} as {}", type_name::<T>())
}

impl ColumnValue for bool {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Integer(i64::from(*self))
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        match value {
            SqlValue::Null => Ok(false),
            SqlValue::Integer(v) => Ok(v != 0),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

macro_rules! integer_column_value {
    ($($ty:ty),*) => {$(
        impl ColumnValue for $ty {
            fn to_sql(&self) -> SqlValue {
                SqlValue::Integer(i64::from(*self))
            }

            fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
                match value {
                    SqlValue::Null => Ok(0),
                    SqlValue::Integer(v) => <$ty>::try_from(v)
                        .map_err(|_| format!("{v} is out of range for {}", type_name::<$ty>())),
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    )*};
}

integer_column_value!(i8, i16, i32, i64);

impl ColumnValue for f64 {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Real(*self)
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        match value {
            SqlValue::Null => Ok(0.0),
            SqlValue::Real(v) => Ok(v),
            SqlValue::Integer(v) => Ok(v as f64),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnValue for f32 {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Real(f64::from(*self))
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        f64::from_sql(value).map(|v| v as f32)
    }
}

impl ColumnValue for char {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Integer(i64::from(u32::from(*self)))
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        match value {
            SqlValue::Null => Ok('\0'),
            SqlValue::Integer(v) => u32::try_from(v)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| format!("{v} is not a valid code point")),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnValue for String {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        match value {
            SqlValue::Null => Ok(String::new()),
            SqlValue::Text(v) => Ok(v),
            SqlValue::Integer(v) => Ok(v.to_string()),
            SqlValue::Real(v) => Ok(v.to_string()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnValue for DateTime<Utc> {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Integer(self.timestamp_millis())
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        match value {
            SqlValue::Null => Ok(DateTime::<Utc>::UNIX_EPOCH),
            SqlValue::Integer(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| format!("{ms} is out of range for a timestamp")),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnValue for NaiveDateTime {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Integer(self.and_utc().timestamp_millis())
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        DateTime::<Utc>::from_sql(value).map(|dt| dt.naive_utc())
    }
}

impl ColumnValue for NaiveDate {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Integer(
            self.signed_duration_since(DateTime::<Utc>::UNIX_EPOCH.date_naive())
                .num_days(),
        )
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        let epoch = DateTime::<Utc>::UNIX_EPOCH.date_naive();
        match value {
            SqlValue::Null => Ok(epoch),
            SqlValue::Integer(days) => chrono::Duration::try_days(days)
                .and_then(|d| epoch.checked_add_signed(d))
                .ok_or_else(|| format!("{days} days is out of range for a date")),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    fn to_sql(&self) -> SqlValue {
        self.as_ref().map_or(SqlValue::Null, ColumnValue::to_sql)
    }

    fn from_sql(value: SqlValue) -> std::result::Result<Self, String> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql(other).map(Some),
        }
    }
}

/// A user-supplied converter, attached per field or registered per type.
///
/// # Examples
///
/// See [`TextEnumLens`] for a ready-made implementation.
pub trait CustomLens: fmt::Debug + Send + Sync {
    /// Stable name, used in descriptors and error messages.
    fn name(&self) -> &str;

    /// Storage class of the column.
    fn sql_type(&self) -> SqlType;

    /// Value written when none is supplied, or `None` for `NULL`.
    fn default_value(&self) -> Option<SqlValue>;

    /// Encodes a field value. `value` is the field, type-erased.
    fn encode(&self, value: &dyn Any) -> std::result::Result<SqlValue, String>;

    /// Decodes a stored value into a boxed field value.
    fn decode(&self, value: SqlValue) -> std::result::Result<Box<dyn Any>, String>;
}

/// Stores an enum-like type as text, one label per variant.
///
/// `NULL` reads back as the configured default; an unknown label is an
/// error.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use lensorm_core::{Lens, SqlValue, TextEnumLens};
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Mood { Calm, Angry }
///
/// let lens = Lens::Custom(Arc::new(TextEnumLens::new(
///     "mood",
///     Mood::Calm,
///     |m| match m { Mood::Calm => "calm", Mood::Angry => "angry" },
///     |s| match s { "calm" => Some(Mood::Calm), "angry" => Some(Mood::Angry), _ => None },
/// )));
///
/// assert_eq!(lens.encode("mood", &Mood::Angry).unwrap(), SqlValue::Text("angry".into()));
/// let back = lens.decode("mood", SqlValue::Text("calm".into())).unwrap();
/// assert_eq!(back.downcast_ref::<Mood>(), Some(&Mood::Calm));
/// ```
pub struct TextEnumLens<T> {
    name: String,
    default: T,
    to_text: fn(&T) -> &'static str,
    from_text: fn(&str) -> Option<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TextEnumLens<T> {
    /// Creates a lens from a label pair.
    pub fn new(
        name: impl Into<String>,
        default: T,
        to_text: fn(&T) -> &'static str,
        from_text: fn(&str) -> Option<T>,
    ) -> Self {
        Self {
            name: name.into(),
            default,
            to_text,
            from_text,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TextEnumLens<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextEnumLens")
            .field("name", &self.name)
            .field("type", &type_name::<T>())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> CustomLens for TextEnumLens<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Text
    }

    fn default_value(&self) -> Option<SqlValue> {
        Some(SqlValue::Text((self.to_text)(&self.default).to_string()))
    }

    fn encode(&self, value: &dyn Any) -> std::result::Result<SqlValue, String> {
        value
            .downcast_ref::<T>()
            .map(|v| SqlValue::Text((self.to_text)(v).to_string()))
            .ok_or_else(|| format!("expected a value of type {}", type_name::<T>()))
    }

    fn decode(&self, value: SqlValue) -> std::result::Result<Box<dyn Any>, String> {
        match value {
            SqlValue::Null => Ok(Box::new(self.default.clone())),
            SqlValue::Text(label) => (self.from_text)(&label)
                .map(|v| Box::new(v) as Box<dyn Any>)
                .ok_or_else(|| format!("unknown label `{label}` for {}", self.name)),
            other => Err(mismatch::<T>(&other)),
        }
    }
}

/// A column converter.
///
/// Closed set of built-in lenses plus [`Lens::Custom`] for application
/// types. Stateless and cheap to clone; one lens may serve many columns.
#[derive(Debug, Clone)]
pub enum Lens {
    /// `bool` as 0/1.
    Bool,
    /// `Option<bool>`.
    NullableBool,
    /// `i8`.
    I8,
    /// `Option<i8>`.
    NullableI8,
    /// `i16`.
    I16,
    /// `Option<i16>`.
    NullableI16,
    /// `i32`.
    I32,
    /// `Option<i32>`.
    NullableI32,
    /// `i64`.
    I64,
    /// `Option<i64>`.
    NullableI64,
    /// `f32` as REAL.
    F32,
    /// `Option<f32>`.
    NullableF32,
    /// `f64` as REAL.
    F64,
    /// `Option<f64>`.
    NullableF64,
    /// `char` as its code point.
    Char,
    /// `Option<char>`.
    NullableChar,
    /// `String`.
    Text,
    /// `Option<String>`.
    NullableText,
    /// `DateTime<Utc>` as epoch milliseconds.
    DateTime,
    /// `Option<DateTime<Utc>>`.
    NullableDateTime,
    /// `NaiveDateTime` as epoch milliseconds, read as UTC.
    NaiveDateTime,
    /// `Option<NaiveDateTime>`.
    NullableNaiveDateTime,
    /// `NaiveDate` as days since 1970-01-01.
    Date,
    /// `Option<NaiveDate>`.
    NullableDate,
    /// `Vec<String>` stored as one delimited text value.
    StringList { delimiter: char },
    /// Application-defined converter.
    Custom(Arc<dyn CustomLens>),
}

fn encode_as<T: ColumnValue>(value: &dyn Any) -> std::result::Result<SqlValue, String> {
    value
        .downcast_ref::<T>()
        .map(ColumnValue::to_sql)
        .ok_or_else(|| format!("expected a value of type {}", type_name::<T>()))
}

fn decode_as<T: ColumnValue>(value: SqlValue) -> std::result::Result<Box<dyn Any>, String> {
    T::from_sql(value).map(|v| Box::new(v) as Box<dyn Any>)
}

impl Lens {
    /// Comma-delimited string list.
    pub const LIST: Self = Self::StringList {
        delimiter: LIST_DELIMITER,
    };

    /// Unit-separator-delimited string list, for members that may contain
    /// commas.
    pub const UNIT_SEPARATED_LIST: Self = Self::StringList {
        delimiter: UNIT_SEPARATOR,
    };

    /// Stable name of the lens.
    pub fn name(&self) -> &str {
        match self {
            Self::Bool => "bool",
            Self::NullableBool => "bool?",
            Self::I8 => "i8",
            Self::NullableI8 => "i8?",
            Self::I16 => "i16",
            Self::NullableI16 => "i16?",
            Self::I32 => "i32",
            Self::NullableI32 => "i32?",
            Self::I64 => "i64",
            Self::NullableI64 => "i64?",
            Self::F32 => "f32",
            Self::NullableF32 => "f32?",
            Self::F64 => "f64",
            Self::NullableF64 => "f64?",
            Self::Char => "char",
            Self::NullableChar => "char?",
            Self::Text => "text",
            Self::NullableText => "text?",
            Self::DateTime => "datetime",
            Self::NullableDateTime => "datetime?",
            Self::NaiveDateTime => "naive-datetime",
            Self::NullableNaiveDateTime => "naive-datetime?",
            Self::Date => "date",
            Self::NullableDate => "date?",
            Self::StringList { delimiter } if *delimiter == UNIT_SEPARATOR => "list-us",
            Self::StringList { .. } => "list",
            Self::Custom(custom) => custom.name(),
        }
    }

    /// Storage class of columns using this lens.
    pub fn sql_type(&self) -> SqlType {
        match self {
            Self::F32 | Self::NullableF32 | Self::F64 | Self::NullableF64 => SqlType::Real,
            Self::Text | Self::NullableText | Self::StringList { .. } => SqlType::Text,
            Self::Custom(custom) => custom.sql_type(),
            _ => SqlType::Integer,
        }
    }

    /// Returns `true` for lenses over `Option<T>`.
    ///
    /// Columns bound to a nullable lens default to `NULL` in DDL unless the
    /// declaration overrides nullability.
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::NullableBool
            | Self::NullableI8
            | Self::NullableI16
            | Self::NullableI32
            | Self::NullableI64
            | Self::NullableF32
            | Self::NullableF64
            | Self::NullableChar
            | Self::NullableText
            | Self::NullableDateTime
            | Self::NullableNaiveDateTime
            | Self::NullableDate => true,
            Self::Custom(custom) => custom.default_value().is_none(),
            _ => false,
        }
    }

    /// The non-null default, or `None` when an unset value is `NULL`.
    pub fn default_value(&self) -> Option<SqlValue> {
        match self {
            Self::Custom(custom) => custom.default_value(),
            lens if lens.is_nullable() => None,
            Self::F32 | Self::F64 => Some(SqlValue::Real(0.0)),
            Self::Text | Self::StringList { .. } => Some(SqlValue::Text(String::new())),
            _ => Some(SqlValue::Integer(0)),
        }
    }

    /// Literal of [`default_value`](Self::default_value), `NULL` if absent.
    pub fn default_literal(&self) -> String {
        self.default_value()
            .unwrap_or(SqlValue::Null)
            .to_literal()
    }

    /// Encodes a field value for `column`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] if `value` is not of the lens's type.
    pub fn encode(&self, column: &str, value: &dyn Any) -> Result<SqlValue> {
        let encoded = match self {
            Self::Bool => encode_as::<bool>(value),
            Self::NullableBool => encode_as::<Option<bool>>(value),
            Self::I8 => encode_as::<i8>(value),
            Self::NullableI8 => encode_as::<Option<i8>>(value),
            Self::I16 => encode_as::<i16>(value),
            Self::NullableI16 => encode_as::<Option<i16>>(value),
            Self::I32 => encode_as::<i32>(value),
            Self::NullableI32 => encode_as::<Option<i32>>(value),
            Self::I64 => encode_as::<i64>(value),
            Self::NullableI64 => encode_as::<Option<i64>>(value),
            Self::F32 => encode_as::<f32>(value),
            Self::NullableF32 => encode_as::<Option<f32>>(value),
            Self::F64 => encode_as::<f64>(value),
            Self::NullableF64 => encode_as::<Option<f64>>(value),
            Self::Char => encode_as::<char>(value),
            Self::NullableChar => encode_as::<Option<char>>(value),
            Self::Text => encode_as::<String>(value),
            Self::NullableText => encode_as::<Option<String>>(value),
            Self::DateTime => encode_as::<DateTime<Utc>>(value),
            Self::NullableDateTime => encode_as::<Option<DateTime<Utc>>>(value),
            Self::NaiveDateTime => encode_as::<NaiveDateTime>(value),
            Self::NullableNaiveDateTime => encode_as::<Option<NaiveDateTime>>(value),
            Self::Date => encode_as::<NaiveDate>(value),
            Self::NullableDate => encode_as::<Option<NaiveDate>>(value),
            Self::StringList { delimiter } => value
                .downcast_ref::<Vec<String>>()
                .map(|items| SqlValue::Text(items.join(delimiter.to_string().as_str())))
                .ok_or_else(|| "expected a value of type Vec<String>".to_string()),
            Self::Custom(custom) => custom.encode(value),
        };
        encoded.map_err(|message| Error::conversion(column, message))
    }

    /// Decodes a stored value for `column` into a boxed field value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] if the stored value cannot be
    /// represented in the lens's type.
    pub fn decode(&self, column: &str, value: SqlValue) -> Result<Box<dyn Any>> {
        let decoded = match self {
            Self::Bool => decode_as::<bool>(value),
            Self::NullableBool => decode_as::<Option<bool>>(value),
            Self::I8 => decode_as::<i8>(value),
            Self::NullableI8 => decode_as::<Option<i8>>(value),
            Self::I16 => decode_as::<i16>(value),
            Self::NullableI16 => decode_as::<Option<i16>>(value),
            Self::I32 => decode_as::<i32>(value),
            Self::NullableI32 => decode_as::<Option<i32>>(value),
            Self::I64 => decode_as::<i64>(value),
            Self::NullableI64 => decode_as::<Option<i64>>(value),
            Self::F32 => decode_as::<f32>(value),
            Self::NullableF32 => decode_as::<Option<f32>>(value),
            Self::F64 => decode_as::<f64>(value),
            Self::NullableF64 => decode_as::<Option<f64>>(value),
            Self::Char => decode_as::<char>(value),
            Self::NullableChar => decode_as::<Option<char>>(value),
            Self::Text => decode_as::<String>(value),
            Self::NullableText => decode_as::<Option<String>>(value),
            Self::DateTime => decode_as::<DateTime<Utc>>(value),
            Self::NullableDateTime => decode_as::<Option<DateTime<Utc>>>(value),
            Self::NaiveDateTime => decode_as::<NaiveDateTime>(value),
            Self::NullableNaiveDateTime => decode_as::<Option<NaiveDateTime>>(value),
            Self::Date => decode_as::<NaiveDate>(value),
            Self::NullableDate => decode_as::<Option<NaiveDate>>(value),
            Self::StringList { delimiter } => {
                String::from_sql(value).map(|joined| -> Box<dyn Any> {
                    if joined.is_empty() {
                        Box::new(Vec::<String>::new())
                    } else {
                        Box::new(
                            joined
                                .split(*delimiter)
                                .map(String::from)
                                .collect::<Vec<_>>(),
                        )
                    }
                })
            }
            Self::Custom(custom) => custom.decode(value),
        };
        decoded.map_err(|message| Error::conversion(column, message))
    }

    /// Renders a field value as an SQL literal.
    pub fn literal(&self, column: &str, value: &dyn Any) -> Result<String> {
        Ok(self.encode(column, value)?.to_literal())
    }

    /// Encodes a field value into `row` under `column`.
    pub fn write(&self, column: &str, value: &dyn Any, row: &mut RowValues) -> Result<()> {
        row.put(column, self.encode(column, value)?);
        Ok(())
    }

    /// Reads `column` from a cursor or key-value bag and decodes it.
    pub fn read(&self, column: &str, row: &dyn RowCursor) -> Result<Box<dyn Any>> {
        self.decode(column, row.value(column)?)
    }
}

impl PartialEq for Lens {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b) || a.name() == b.name(),
            (Self::StringList { delimiter: a }, Self::StringList { delimiter: b }) => a == b,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}
