//! SQLite store binding for lensorm.
//!
//! # Architecture
//!
//! - **`schema`**: DDL text and additive migration planning
//! - **`migration`**: `PRAGMA user_version` tracking and the
//!   `on_create` / `on_upgrade` trigger points
//! - **`convert`**: lensorm values ↔ rusqlite values, and a row cursor
//!   over rusqlite rows
//! - **`query`**: the [`Database`] CRUD surface
//!
//! # Quick start
//!
//! ```no_run
//! use lensorm_db::SchemaFile;
//! use lensorm_sqlite::{Migration, plan_create};
//! use rusqlite::Connection;
//!
//! let schema = SchemaFile::load("schema/app.yaml").unwrap().into_schema();
//! for step in plan_create(&schema) {
//!     println!("{};", step.sql());
//! }
//!
//! let mut migration = Migration::new(Connection::open("app.db").unwrap(), schema).unwrap();
//! println!("{}", migration.migrate().unwrap());
//! ```

mod convert;
mod error;
mod migration;
mod query;
mod schema;

pub use convert::SqliteRow;
pub use error::{Result, SqliteError};
pub use migration::{Migration, MigrationOutcome, MigrationStatus, TableStatus};
pub use query::Database;
pub use schema::{
    MigrationStep, add_column_sql, column_definition, create_table_sql, plan_create,
    plan_create_at, plan_upgrade,
};
