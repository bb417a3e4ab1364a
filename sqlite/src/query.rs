//! CRUD access to row models stored in SQLite.
//!
//! [`Database`] ties a [`Schema`], a shared [`Reflector`], and a connection
//! together. Opening or binding a connection migrates it to the schema's
//! version first.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lensorm_core::{MAGIC_ID, ModelDecl, Reflector, RowModel, Schema};
//! use lensorm_sqlite::Database;
//!
//! #[derive(Default)]
//! struct Note {
//!     id: Option<i64>,
//!     title: String,
//! }
//!
//! impl RowModel for Note {
//!     fn declare(model: &mut ModelDecl<Self>) {
//!         model.table("notes").default_constructor();
//!         model.column("id", |n| &n.id, |n, v| n.id = v).name(MAGIC_ID);
//!         model.column("title", |n| &n.title, |n, v| n.title = v).key();
//!     }
//! }
//!
//! let reflector = Arc::new(Reflector::default());
//! let schema = Schema::builder("notes.db", 1)
//!     .reflector(Arc::clone(&reflector))
//!     .table::<Note>()
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let mut db = Database::new(schema, reflector);
//! db.open("notes.db").unwrap();
//!
//! let mut note = Note { id: None, title: "groceries".into() };
//! db.insert(&mut note).unwrap();
//! assert!(note.id.is_some());
//!
//! let found: Option<Note> = db.select_by_key(&"groceries".to_string()).unwrap();
//! assert!(found.is_some());
//! ```

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use lensorm_core::{Reflector, RowModel, Schema, Statement, TableDescriptor};
use rusqlite::{Connection, Rows, params_from_iter};
use tracing::debug;

use crate::convert::{SqliteRow, to_value};
use crate::error::{Result, SqliteError};
use crate::migration::{Migration, MigrationOutcome};

/// A schema bound to an optional SQLite connection.
///
/// Operations issued while no connection is bound fail with
/// [`SqliteError::Unbound`]. The connection is used from one thread at a
/// time; share a `Database` behind a `Mutex` or give each thread its own.
pub struct Database {
    schema: Schema,
    reflector: Arc<Reflector>,
    conn: Option<Connection>,
}

impl Database {
    /// Creates an unbound database for `schema`.
    ///
    /// `reflector` should be the one the schema was built with, so field
    /// overrides and custom lenses agree.
    pub fn new(schema: Schema, reflector: Arc<Reflector>) -> Self {
        Self {
            schema,
            reflector,
            conn: None,
        }
    }

    /// Opens (or creates) the database file at `path` and migrates it.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<MigrationOutcome> {
        self.bind(Connection::open(path)?)
    }

    /// Opens a private in-memory database and creates the schema.
    pub fn open_in_memory(&mut self) -> Result<MigrationOutcome> {
        self.bind(Connection::open_in_memory()?)
    }

    /// Migrates `conn` to the schema's version and binds it, replacing any
    /// previously bound connection.
    pub fn bind(&mut self, conn: Connection) -> Result<MigrationOutcome> {
        let mut migration = Migration::new(conn, self.schema.clone())?;
        let outcome = migration.migrate()?;
        self.conn = Some(migration.into_connection());
        Ok(outcome)
    }

    /// Unbinds and returns the connection.
    pub fn close(&mut self) -> Option<Connection> {
        self.conn.take()
    }

    /// Returns `true` if a connection is bound.
    pub fn is_bound(&self) -> bool {
        self.conn.is_some()
    }

    /// The bound connection.
    pub fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(SqliteError::Unbound)
    }

    /// The schema this database is migrated to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The reflector used for row models.
    pub fn reflector(&self) -> &Arc<Reflector> {
        &self.reflector
    }

    /// Inserts `instance` and returns the new row id.
    ///
    /// The id is also written into the field bound to the surrogate key, if
    /// the model declares one.
    pub fn insert<M: RowModel>(&self, instance: &mut M) -> Result<i64> {
        let conn = self.connection()?;
        let descriptor = self.reflector.reflect::<M>()?;
        let statement = descriptor.insert_statement(instance)?;
        execute(conn, &descriptor, &statement)?;

        let id = conn.last_insert_rowid();
        descriptor.set_magic_id(instance, id)?;
        Ok(id)
    }

    /// Updates the row matching `instance`'s key and returns the number of
    /// rows changed.
    pub fn update<M: RowModel>(&self, instance: &M) -> Result<usize> {
        let conn = self.connection()?;
        let descriptor = self.reflector.reflect::<M>()?;
        let statement = descriptor.update_statement(instance)?;
        execute(conn, &descriptor, &statement)
    }

    /// Deletes the row matching `instance`'s key and returns the number of
    /// rows removed.
    pub fn delete<M: RowModel>(&self, instance: &M) -> Result<usize> {
        let conn = self.connection()?;
        let descriptor = self.reflector.reflect::<M>()?;
        let statement = descriptor.delete_statement(instance)?;
        execute(conn, &descriptor, &statement)
    }

    /// Loads the row whose key (or surrogate key) equals `key`.
    ///
    /// `key` must have the key field's type.
    pub fn select_by_key<M: RowModel, K: Any>(&self, key: &K) -> Result<Option<M>> {
        let descriptor = self.reflector.reflect::<M>()?;
        let statement = descriptor.select_by_key_statement(key)?;
        Ok(self.query(&descriptor, &statement)?.into_iter().next())
    }

    /// Loads the row with surrogate key `id`.
    pub fn select_by_id<M: RowModel>(&self, id: i64) -> Result<Option<M>> {
        let descriptor = self.reflector.reflect::<M>()?;
        let statement = descriptor.select_by_id_statement(id);
        Ok(self.query(&descriptor, &statement)?.into_iter().next())
    }

    /// Loads every row of `M`'s table.
    pub fn select_all<M: RowModel>(&self) -> Result<Vec<M>> {
        let descriptor = self.reflector.reflect::<M>()?;
        let statement = descriptor.select_all_statement();
        self.query(&descriptor, &statement)
    }

    /// Materializes every remaining row of a result set as `M`.
    ///
    /// Columns are matched by name; columns of `M` the result set lacks read
    /// as `NULL`.
    pub fn process_result_set<M: RowModel>(&self, rows: &mut Rows<'_>) -> Result<Vec<M>> {
        let descriptor = self.reflector.reflect::<M>()?;
        collect_rows(&descriptor, rows, SqliteError::from)
    }

    fn query<M: RowModel>(
        &self,
        descriptor: &TableDescriptor<M>,
        statement: &Statement,
    ) -> Result<Vec<M>> {
        let conn = self.connection()?;
        debug!(model = descriptor.model(), sql = %statement, "query");
        let failed = |source: rusqlite::Error| execution_error(descriptor, statement, source);

        let mut prepared = conn.prepare(&statement.sql).map_err(failed)?;
        let mut rows = prepared
            .query(params_from_iter(statement.params.iter().map(to_value)))
            .map_err(failed)?;
        collect_rows(descriptor, &mut rows, failed)
    }
}

/// Materializes rows; `failed` wraps errors raised while stepping.
fn collect_rows<M: RowModel>(
    descriptor: &TableDescriptor<M>,
    rows: &mut Rows<'_>,
    failed: impl Fn(rusqlite::Error) -> SqliteError,
) -> Result<Vec<M>> {
    let mut instances = Vec::new();
    while let Some(row) = rows.next().map_err(&failed)? {
        instances.push(descriptor.from_row(&SqliteRow::new(row))?);
    }
    Ok(instances)
}

fn execute<M: RowModel>(
    conn: &Connection,
    descriptor: &TableDescriptor<M>,
    statement: &Statement,
) -> Result<usize> {
    debug!(model = descriptor.model(), sql = %statement, "execute");
    conn.execute(
        &statement.sql,
        params_from_iter(statement.params.iter().map(to_value)),
    )
    .map_err(|source| execution_error(descriptor, statement, source))
}

fn execution_error<M: RowModel>(
    descriptor: &TableDescriptor<M>,
    statement: &Statement,
    source: rusqlite::Error,
) -> SqliteError {
    SqliteError::Execution {
        model: descriptor.model().to_string(),
        statement: statement.sql.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensorm_core::{MAGIC_ID, ModelDecl};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Tag {
        id: Option<i64>,
        label: String,
        uses: i32,
    }

    impl RowModel for Tag {
        fn declare(model: &mut ModelDecl<Self>) {
            model.table("tags").default_constructor();
            model.column("id", |t| &t.id, |t, v| t.id = v).name(MAGIC_ID);
            model.column("label", |t| &t.label, |t, v| t.label = v).key();
            model.column("uses", |t| &t.uses, |t, v| t.uses = v);
        }
    }

    fn database() -> Database {
        let reflector = Arc::new(Reflector::default());
        let schema = Schema::builder("tags.db", 1)
            .reflector(Arc::clone(&reflector))
            .table::<Tag>()
            .unwrap()
            .build()
            .unwrap();
        Database::new(schema, reflector)
    }

    fn tag(label: &str) -> Tag {
        Tag {
            id: None,
            label: label.into(),
            uses: 1,
        }
    }

    #[test]
    fn test_unbound_operations_fail() {
        let db = database();
        assert!(!db.is_bound());
        assert!(matches!(db.insert(&mut tag("a")), Err(SqliteError::Unbound)));
        assert!(matches!(db.select_all::<Tag>(), Err(SqliteError::Unbound)));
    }

    #[test]
    fn test_insert_writes_back_id() {
        let mut db = database();
        assert_eq!(
            db.open_in_memory().unwrap(),
            MigrationOutcome::Created { version: 1 }
        );
        let mut first = tag("a");
        let mut second = tag("b");
        let id = db.insert(&mut first).unwrap();
        assert_eq!(first.id, Some(id));
        assert_eq!(db.insert(&mut second).unwrap(), id + 1);

        let loaded: Tag = db.select_by_id(id).unwrap().unwrap();
        assert_eq!(loaded, first);
    }

    #[test]
    fn test_unique_violation_is_execution_error() {
        let mut db = database();
        db.open_in_memory().unwrap();
        db.insert(&mut tag("dup")).unwrap();
        match db.insert(&mut tag("dup")) {
            Err(SqliteError::Execution { model, statement, .. }) => {
                assert!(model.ends_with("Tag"));
                assert!(statement.starts_with("INSERT INTO tags"));
            }
            other => panic!("expected an execution error, got {other:?}"),
        }
    }

    #[derive(Debug, Default)]
    struct Overflow {
        n: i64,
    }

    impl RowModel for Overflow {
        fn declare(model: &mut ModelDecl<Self>) {
            model.table("overflow").default_constructor();
            model.column("n", |o| &o.n, |o, v| o.n = v);
        }
    }

    #[test]
    fn test_step_failure_is_execution_error() {
        let mut db = database();
        db.open_in_memory().unwrap();
        // abs() of i64::MIN only fails once the row is computed.
        db.connection()
            .unwrap()
            .execute_batch("CREATE VIEW overflow AS SELECT abs(-9223372036854775808) AS n")
            .unwrap();

        match db.select_all::<Overflow>() {
            Err(SqliteError::Execution { model, statement, .. }) => {
                assert!(model.ends_with("Overflow"));
                assert_eq!(statement, "SELECT * FROM overflow");
            }
            other => panic!("expected an execution error, got {other:?}"),
        }
    }

    #[test]
    fn test_close_unbinds() {
        let mut db = database();
        db.open_in_memory().unwrap();
        assert!(db.close().is_some());
        assert!(matches!(db.connection(), Err(SqliteError::Unbound)));
    }
}
