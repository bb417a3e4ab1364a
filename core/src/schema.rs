//! Schema manifest: the tables of one database at one version.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::TableSchema;
use crate::error::{Error, Result};
use crate::model::RowModel;
use crate::reflect::Reflector;
use crate::validate::validate_schema;

/// An ordered set of tables, a target version, and a database name.
///
/// Built from row models with [`Schema::builder`], or deserialized from a
/// schema file. Either way it is plain data that DDL generation and
/// fingerprinting work from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Database name.
    pub name: String,
    /// Target schema version, at least 1.
    pub version: u32,
    /// Tables in declaration order.
    pub tables: Vec<TableSchema>,
}

impl Schema {
    /// Starts a manifest for database `name` at `version`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lensorm_core::{ModelDecl, RowModel, Schema};
    ///
    /// #[derive(Default)]
    /// struct Note {
    ///     id: Option<i64>,
    ///     body: String,
    /// }
    ///
    /// impl RowModel for Note {
    ///     fn declare(model: &mut ModelDecl<Self>) {
    ///         model.table("notes").default_constructor();
    ///         model.column("id", |n| &n.id, |n, v| n.id = v).name("_id");
    ///         model.column("body", |n| &n.body, |n, v| n.body = v);
    ///     }
    /// }
    ///
    /// let schema = Schema::builder("notes.db", 1).table::<Note>()?.build()?;
    /// assert_eq!(schema.table("notes").unwrap().columns.len(), 2);
    /// # Ok::<(), lensorm_core::Error>(())
    /// ```
    pub fn builder(name: impl Into<String>, version: u32) -> SchemaBuilder {
        SchemaBuilder {
            reflector: Arc::new(Reflector::default()),
            name: name.into(),
            version,
            tables: Vec::new(),
        }
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables that exist at `version`.
    pub fn tables_at(&self, version: u32) -> impl Iterator<Item = &TableSchema> {
        self.tables.iter().filter(move |t| t.since <= version)
    }

    /// Checks the manifest's structural rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let errors = validate_schema(self);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidSchema {
                schema: self.name.clone(),
                errors,
            })
        }
    }
}

/// Collects reflected tables into a [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    reflector: Arc<Reflector>,
    name: String,
    version: u32,
    tables: Vec<TableSchema>,
}

impl SchemaBuilder {
    /// Reflects through `reflector` instead of a private default one.
    ///
    /// Call before adding tables so custom lenses and field overrides apply.
    pub fn reflector(mut self, reflector: Arc<Reflector>) -> Self {
        self.reflector = reflector;
        self
    }

    /// Reflects `M` and appends its table.
    pub fn table<M: RowModel>(mut self) -> Result<Self> {
        let descriptor = self.reflector.reflect::<M>()?;
        self.tables.push(descriptor.schema().clone());
        Ok(self)
    }

    /// Validates and returns the manifest.
    pub fn build(self) -> Result<Schema> {
        let schema = Schema {
            name: self.name,
            version: self.version,
            tables: self.tables,
        };
        schema.validate()?;
        Ok(schema)
    }
}
