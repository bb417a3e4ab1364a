//! Schema and table validation.
//!
//! Validates structural invariants of table shapes and schema manifests,
//! catching duplicate names, unreachable `since` versions, and malformed
//! identifiers before any DDL is generated.
//!
//! # Examples
//!
//! ```
//! use lensorm_core::*;
//!
//! let mut table = TableSchema {
//!     name: "notes".into(),
//!     since: 1,
//!     columns: vec![ColumnSchema::new("body", SqlType::Text)],
//! };
//! assert!(validate_table(&table).is_empty());
//!
//! table.columns.push(ColumnSchema::new("body", SqlType::Integer));
//! assert!(!validate_table(&table).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::descriptor::TableSchema;
use crate::schema::Schema;
use crate::value::SqlType;

/// Schema/table validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Database name is empty or whitespace-only.
    #[error("schema name cannot be empty")]
    EmptySchemaName,
    /// Schema version 0 is reserved for "nothing installed".
    #[error("schema version must be at least 1")]
    ZeroVersion,
    /// Table or column name is not a plain SQL identifier.
    #[error("invalid identifier: `{0}`")]
    InvalidIdentifier(String),
    /// Two tables share a name.
    #[error("duplicate table: {0}")]
    DuplicateTable(String),
    /// A table declares no columns.
    #[error("table `{0}` has no columns")]
    EmptyTable(String),
    /// Two columns of the same table share a name.
    #[error("duplicate column `{column}` in table `{table}`")]
    DuplicateColumn { table: String, column: String },
    /// More than one column is flagged as key.
    #[error("table `{0}` declares more than one key column")]
    MultipleKeys(String),
    /// A `since` of 0 on a table or column.
    #[error("`since` must be at least 1 for `{0}`")]
    ZeroSince(String),
    /// The surrogate key column is bound to a non-integer field.
    #[error("surrogate key column of table `{0}` must be INTEGER")]
    MagicIdNotInteger(String),
    /// The key column is introduced after its table. SQLite cannot add a
    /// `UNIQUE` column to an existing table.
    #[error("key column `{table}.{column}` must be introduced with its table")]
    LateKey { table: String, column: String },
    /// A table is introduced after the schema's declared version.
    #[error("table `{table}` since {since} is newer than schema version {version}")]
    UnreachableTable { table: String, since: u32, version: u32 },
    /// A column is introduced after the schema's declared version.
    #[error("column `{table}.{column}` since {since} is newer than schema version {version}")]
    UnreachableColumn {
        table: String,
        column: String,
        since: u32,
        version: u32,
    },
}

/// Returns `true` if `name` is a plain SQL identifier: ASCII letters,
/// digits, and underscores, not starting with a digit.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates the shape of a single table.
///
/// Checks identifiers, duplicate columns, the single-key rule, `since`
/// values, and the surrogate key column's storage class.
/// A key column must also be introduced together with its table.
pub fn validate_table(table: &TableSchema) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !is_valid_identifier(&table.name) {
        errors.push(ValidationError::InvalidIdentifier(table.name.clone()));
        return errors;
    }
    if table.since == 0 {
        errors.push(ValidationError::ZeroSince(table.name.clone()));
    }
    if table.columns.is_empty() {
        errors.push(ValidationError::EmptyTable(table.name.clone()));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for column in &table.columns {
        if !is_valid_identifier(&column.name) {
            errors.push(ValidationError::InvalidIdentifier(column.name.clone()));
            continue;
        }
        if !seen.insert(column.name.as_str()) {
            errors.push(ValidationError::DuplicateColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
        if column.since == 0 {
            errors.push(ValidationError::ZeroSince(format!(
                "{}.{}",
                table.name, column.name
            )));
        }
        if column.key && column.since > table.since {
            errors.push(ValidationError::LateKey {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
        if column.is_magic_id() && column.sql_type != SqlType::Integer {
            errors.push(ValidationError::MagicIdNotInteger(table.name.clone()));
        }
    }

    if table.columns.iter().filter(|c| c.key).count() > 1 {
        errors.push(ValidationError::MultipleKeys(table.name.clone()));
    }

    errors
}

/// Validates a full schema manifest.
///
/// Runs [`validate_table`] on every table and additionally checks the
/// schema name, the version, duplicate table names, and that no table or
/// column is introduced after the schema's version.
pub fn validate_schema(schema: &Schema) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if schema.name.trim().is_empty() {
        errors.push(ValidationError::EmptySchemaName);
        return errors;
    }
    if schema.version == 0 {
        errors.push(ValidationError::ZeroVersion);
        return errors;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for table in &schema.tables {
        if !seen.insert(table.name.as_str()) {
            errors.push(ValidationError::DuplicateTable(table.name.clone()));
            continue;
        }
        errors.extend(validate_table(table));

        if table.since > schema.version {
            errors.push(ValidationError::UnreachableTable {
                table: table.name.clone(),
                since: table.since,
                version: schema.version,
            });
        }
        for column in table.columns.iter().filter(|c| c.since > schema.version) {
            errors.push(ValidationError::UnreachableColumn {
                table: table.name.clone(),
                column: column.name.clone(),
                since: column.since,
                version: schema.version,
            });
        }
    }

    errors
}
