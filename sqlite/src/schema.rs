//! DDL generation and additive migration planning.
//!
//! Every table gets the engine-managed surrogate key as its first column:
//!
//! ```text
//! CREATE TABLE IF NOT EXISTS t ( _id INTEGER PRIMARY KEY AUTOINCREMENT, id INTEGER UNIQUE NOT NULL, name TEXT NULL DEFAULT 'x' )
//! ```
//!
//! followed by the table's columns in their stabilized order. A column bound
//! to `_id` is the application's handle on that surrogate key and is not
//! emitted again.
//!
//! Migration is additive only. Going from version `old` to `new`:
//!
//! - a table introduced after `old` is created with the columns it has at
//!   `new`;
//! - an existing table gets one `ALTER TABLE .. ADD COLUMN` per column
//!   introduced in `old < since <= new`.
//!
//! Planning is a pure function of the schema and the version pair, so
//! upgrading 1→3 yields exactly the union of 1→2 and 2→3, and a fresh
//! create at 3 yields the same tables.

use lensorm_core::{ColumnSchema, MAGIC_ID, Schema, TableSchema};

use crate::error::{Result, SqliteError};

/// Definition of the surrogate key column.
const MAGIC_ID_DEFINITION: &str = "_id INTEGER PRIMARY KEY AUTOINCREMENT";

/// One planned DDL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// `CREATE TABLE IF NOT EXISTS`.
    CreateTable {
        /// Table name.
        table: String,
        /// Statement text.
        sql: String,
    },
    /// `ALTER TABLE .. ADD COLUMN`.
    AddColumn {
        /// Table name.
        table: String,
        /// Added column.
        column: String,
        /// Statement text.
        sql: String,
    },
}

impl MigrationStep {
    /// Statement text.
    pub fn sql(&self) -> &str {
        match self {
            Self::CreateTable { sql, .. } | Self::AddColumn { sql, .. } => sql,
        }
    }

    /// Table the step applies to.
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. } | Self::AddColumn { table, .. } => table,
        }
    }
}

/// Renders `<name> <type> <null-or-key clause> [DEFAULT <literal>]`.
///
/// Key columns are always `UNIQUE NOT NULL`; other columns are `NULL` or
/// `NOT NULL` per their nullability.
pub fn column_definition(column: &ColumnSchema) -> String {
    let constraint = if column.key {
        "UNIQUE NOT NULL"
    } else if column.nullable {
        "NULL"
    } else {
        "NOT NULL"
    };

    let mut definition = format!("{} {} {constraint}", column.name, column.sql_type);
    if let Some(literal) = column.default_literal() {
        definition.push_str(" DEFAULT ");
        definition.push_str(&literal);
    }
    definition
}

/// `CREATE TABLE IF NOT EXISTS` for `table` with the columns it has at
/// `version`.
pub fn create_table_sql(table: &TableSchema, version: u32) -> String {
    let definitions: Vec<String> = std::iter::once(MAGIC_ID_DEFINITION.to_string())
        .chain(
            table
                .columns
                .iter()
                .filter(|c| c.name != MAGIC_ID && c.since <= version)
                .map(column_definition),
        )
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ( {} )",
        table.name,
        definitions.join(", ")
    )
}

/// `ALTER TABLE <table> ADD COLUMN <definition>`.
pub fn add_column_sql(table: &str, column: &ColumnSchema) -> String {
    format!("ALTER TABLE {table} ADD COLUMN {}", column_definition(column))
}

/// Statements creating every table of `schema` at its target version.
pub fn plan_create(schema: &Schema) -> Vec<MigrationStep> {
    plan_create_at(schema, schema.version)
}

/// Statements creating every table that exists at `version`.
pub fn plan_create_at(schema: &Schema, version: u32) -> Vec<MigrationStep> {
    schema
        .tables_at(version)
        .map(|table| create_step(table, version))
        .collect()
}

/// Statements upgrading a database from `old` to `new`.
///
/// # Errors
///
/// Returns [`SqliteError::MigrationError`] unless
/// `1 <= old < new <= schema.version`.
pub fn plan_upgrade(schema: &Schema, old: u32, new: u32) -> Result<Vec<MigrationStep>> {
    if old == 0 || old >= new || new > schema.version {
        return Err(SqliteError::MigrationError(format!(
            "cannot upgrade `{}` from version {old} to {new} (target version is {})",
            schema.name, schema.version
        )));
    }

    let mut steps = Vec::new();
    for table in schema.tables_at(new) {
        if table.since > old {
            steps.push(create_step(table, new));
            continue;
        }
        for column in table
            .columns
            .iter()
            .filter(|c| c.name != MAGIC_ID && c.since > old && c.since <= new)
        {
            steps.push(MigrationStep::AddColumn {
                table: table.name.clone(),
                column: column.name.clone(),
                sql: add_column_sql(&table.name, column),
            });
        }
    }
    Ok(steps)
}

fn create_step(table: &TableSchema, version: u32) -> MigrationStep {
    MigrationStep::CreateTable {
        table: table.name.clone(),
        sql: create_table_sql(table, version),
    }
}
