//! Schema migration lifecycle for a SQLite database.
//!
//! The installed schema version lives in `PRAGMA user_version`; 0 means
//! nothing is installed. [`Migration::migrate`] compares it with the target
//! version of the [`Schema`] and calls the matching trigger point:
//!
//! - [`on_create`](Migration::on_create) for a fresh database,
//! - [`on_upgrade`](Migration::on_upgrade) for an older one.
//!
//! Each trigger runs in a single transaction together with the version
//! bump, so a failed migration leaves the database as it was.
//!
//! # Example
//!
//! ```no_run
//! use lensorm_db::SchemaFile;
//! use lensorm_sqlite::Migration;
//! use rusqlite::Connection;
//!
//! let schema = SchemaFile::load("schema/app.yaml").unwrap().into_schema();
//! let conn = Connection::open("app.db").unwrap();
//! let mut migration = Migration::new(conn, schema).unwrap();
//!
//! let outcome = migration.migrate().unwrap();
//! println!("{outcome}");
//! ```

use std::collections::HashSet;
use std::fmt;

use lensorm_core::Schema;
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, SqliteError};
use crate::schema::{MigrationStep, plan_create, plan_upgrade};

/// Applies a [`Schema`] to one connection.
pub struct Migration {
    conn: Connection,
    schema: Schema,
}

impl Migration {
    /// Creates a migration manager for `conn` targeting `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::Core`] if the schema fails validation.
    pub fn new(conn: Connection, schema: Schema) -> Result<Self> {
        schema.validate()?;
        Ok(Self { conn, schema })
    }

    /// The target schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Schema version recorded in the database.
    pub fn installed_version(&self) -> Result<u32> {
        installed_version(&self.conn)
    }

    /// Brings the database to the schema's version.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationError`] if the database is newer than
    /// the schema, or if any DDL statement fails.
    pub fn migrate(&mut self) -> Result<MigrationOutcome> {
        let installed = self.installed_version()?;
        let target = self.schema.version;

        if installed == 0 {
            self.on_create()?;
            Ok(MigrationOutcome::Created { version: target })
        } else if installed < target {
            self.on_upgrade(installed, target)?;
            Ok(MigrationOutcome::Upgraded {
                from: installed,
                to: target,
            })
        } else if installed == target {
            debug!(schema = %self.schema.name, version = target, "schema up to date");
            Ok(MigrationOutcome::UpToDate { version: target })
        } else {
            Err(SqliteError::MigrationError(format!(
                "database `{}` is at version {installed}, newer than schema version {target}",
                self.schema.name
            )))
        }
    }

    /// Creates every table at the schema's version.
    ///
    /// Uses `CREATE TABLE IF NOT EXISTS` so it is safe to call repeatedly.
    pub fn on_create(&mut self) -> Result<()> {
        info!(
            schema = %self.schema.name,
            version = self.schema.version,
            "creating schema"
        );
        let steps = plan_create(&self.schema);
        self.apply(&steps, self.schema.version)
    }

    /// Upgrades the database from `old` to `new`.
    ///
    /// Columns that already exist are skipped, so re-running an upgrade is
    /// harmless.
    pub fn on_upgrade(&mut self, old: u32, new: u32) -> Result<()> {
        info!(schema = %self.schema.name, from = old, to = new, "upgrading schema");
        let steps = plan_upgrade(&self.schema, old, new)?;
        self.apply(&steps, new)
    }

    /// Reports installed and target versions and the state of each table.
    pub fn status(&self) -> Result<MigrationStatus> {
        let installed_version = self.installed_version()?;
        let mut tables = Vec::with_capacity(self.schema.tables.len());
        for table in &self.schema.tables {
            let exists = table_exists(&self.conn, &table.name)?;
            let row_count = if exists {
                Some(count_rows(&self.conn, &table.name)?)
            } else {
                None
            };
            tables.push(TableStatus {
                name: table.name.clone(),
                since: table.since,
                exists,
                row_count,
            });
        }
        Ok(MigrationStatus {
            schema: self.schema.name.clone(),
            installed_version,
            target_version: self.schema.version,
            tables,
        })
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the migration and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn apply(&mut self, steps: &[MigrationStep], version: u32) -> Result<()> {
        let tx = self.conn.transaction()?;
        for step in steps {
            if let MigrationStep::AddColumn { table, column, .. } = step {
                if column_exists(&tx, table, column)? {
                    debug!(table = %table, column = %column, "column already present");
                    continue;
                }
            }
            debug!(sql = step.sql(), "executing DDL");
            tx.execute_batch(step.sql()).map_err(|e| {
                SqliteError::MigrationError(format!("failed to execute `{}`: {e}", step.sql()))
            })?;
        }
        set_version(&tx, version)?;
        tx.commit()?;
        Ok(())
    }
}

/// Result of [`Migration::migrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// Fresh database; every table was created.
    Created {
        /// Installed version.
        version: u32,
    },
    /// Older database; new tables and columns were added.
    Upgraded {
        /// Previously installed version.
        from: u32,
        /// Installed version.
        to: u32,
    },
    /// Nothing to do.
    UpToDate {
        /// Installed version.
        version: u32,
    },
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { version } => write!(f, "created schema at version {version}"),
            Self::Upgraded { from, to } => write!(f, "upgraded schema from version {from} to {to}"),
            Self::UpToDate { version } => write!(f, "schema is up to date at version {version}"),
        }
    }
}

/// Snapshot returned by [`Migration::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Schema (database) name.
    pub schema: String,
    /// Version recorded in the database, 0 if none.
    pub installed_version: u32,
    /// Version the schema declares.
    pub target_version: u32,
    /// Per-table state, in schema order.
    pub tables: Vec<TableStatus>,
}

impl MigrationStatus {
    /// Returns `true` if [`Migration::migrate`] would change the database.
    pub fn is_pending(&self) -> bool {
        self.installed_version < self.target_version
    }
}

/// State of one table in [`MigrationStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    /// Table name.
    pub name: String,
    /// Version that introduced the table.
    pub since: u32,
    /// Whether the table exists in the database.
    pub exists: bool,
    /// Number of rows, if the table exists.
    pub row_count: Option<usize>,
}

pub(crate) fn installed_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    u32::try_from(version).map_err(|_| {
        SqliteError::MigrationError(format!("invalid user_version {version}"))
    })
}

fn set_version(tx: &Transaction<'_>, version: u32) -> Result<()> {
    tx.execute_batch(&format!("PRAGMA user_version = {version}"))?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(names.contains(column))
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(usize::try_from(count).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensorm_core::{ColumnSchema, SqlType, TableSchema};

    fn schema(version: u32) -> Schema {
        let mut body = ColumnSchema::new("body", SqlType::Text);
        body.nullable = true;
        let mut pinned = ColumnSchema::new("pinned", SqlType::Integer);
        pinned.since = 2;
        let mut tables = vec![TableSchema {
            name: "notes".into(),
            since: 1,
            columns: vec![body, pinned],
        }];
        tables[0].columns.retain(|c| c.since <= version);
        Schema {
            name: "notes.db".into(),
            version,
            tables,
        }
    }

    fn migration(version: u32) -> Migration {
        Migration::new(Connection::open_in_memory().unwrap(), schema(version)).unwrap()
    }

    #[test]
    fn test_fresh_database_is_created() {
        let mut migration = migration(2);
        assert_eq!(migration.installed_version().unwrap(), 0);
        assert!(migration.status().unwrap().is_pending());

        assert_eq!(
            migration.migrate().unwrap(),
            MigrationOutcome::Created { version: 2 }
        );
        let status = migration.status().unwrap();
        assert_eq!(status.installed_version, 2);
        assert!(!status.is_pending());
        assert!(status.tables[0].exists);
        assert_eq!(status.tables[0].row_count, Some(0));

        assert_eq!(
            migration.migrate().unwrap(),
            MigrationOutcome::UpToDate { version: 2 }
        );
    }

    #[test]
    fn test_upgrade_adds_columns() {
        let mut v1 = migration(1);
        v1.migrate().unwrap();
        let conn = v1.into_connection();
        assert!(!column_exists(&conn, "notes", "pinned").unwrap());

        let mut v2 = Migration::new(conn, schema(2)).unwrap();
        assert_eq!(
            v2.migrate().unwrap(),
            MigrationOutcome::Upgraded { from: 1, to: 2 }
        );
        assert!(column_exists(v2.connection(), "notes", "pinned").unwrap());
        assert_eq!(v2.installed_version().unwrap(), 2);
    }

    #[test]
    fn test_upgrade_can_be_rerun() {
        let mut migration = migration(2);
        migration.on_create().unwrap();
        migration.on_upgrade(1, 2).unwrap();
        assert_eq!(migration.installed_version().unwrap(), 2);
    }

    #[test]
    fn test_downgrade_is_rejected() {
        let mut v2 = migration(2);
        v2.migrate().unwrap();
        let mut v1 = Migration::new(v2.into_connection(), schema(1)).unwrap();
        assert!(matches!(v1.migrate(), Err(SqliteError::MigrationError(_))));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = MigrationOutcome::Upgraded { from: 1, to: 3 };
        assert_eq!(
            serde_json::to_value(outcome).unwrap(),
            serde_json::json!({ "action": "upgraded", "from": 1, "to": 3 })
        );
        assert_eq!(outcome.to_string(), "upgraded schema from version 1 to 3");
    }

    #[test]
    fn test_status_before_create() {
        let status = migration(1).status().unwrap();
        assert_eq!(status.installed_version, 0);
        assert_eq!(status.target_version, 1);
        assert!(!status.tables[0].exists);
        assert_eq!(status.tables[0].row_count, None);
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let mut invalid = schema(1);
        invalid.version = 0;
        assert!(matches!(
            Migration::new(Connection::open_in_memory().unwrap(), invalid),
            Err(SqliteError::Core(_))
        ));
    }
}
