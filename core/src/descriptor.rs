//! Table and column descriptors produced by reflection.
//!
//! Descriptors come in two layers:
//!
//! - [`TableSchema`] / [`ColumnSchema`]: the plain-data shape of a table.
//!   Serializable, free of Rust types, and all that DDL generation and
//!   schema files need.
//! - [`TableDescriptor`] / [`Column`]: the shape plus the bound lenses and
//!   field accessors of one row model. Built once per type and shared.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::lens::Lens;
use crate::model::{Getter, Setter, getter, setter};
use crate::value::SqlType;

/// Reserved name of the engine-managed surrogate key column.
pub const MAGIC_ID: &str = "_id";

fn default_since() -> u32 {
    1
}

/// Plain-data description of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Bound field name; empty for columns loaded from a schema file.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    /// Storage class.
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    /// Schema version that introduced the column.
    #[serde(default = "default_since")]
    pub since: u32,
    /// Whether the column accepts `NULL`. Ignored for key columns.
    #[serde(default)]
    pub nullable: bool,
    /// Whether this is the natural key.
    #[serde(default)]
    pub key: bool,
    /// Explicit position used for ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Declared default, raw (unquoted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Converter default as a rendered literal (`NULL` when the converter
    /// has none). When absent, the zero of the storage class is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Name of the bound converter.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lens: String,
}

impl ColumnSchema {
    /// Creates a non-null, non-key column introduced in version 1.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            field: String::new(),
            sql_type,
            since: 1,
            nullable: false,
            key: false,
            index: None,
            default: None,
            fallback: None,
            lens: String::new(),
        }
    }

    /// Returns `true` for the reserved surrogate key column.
    pub fn is_magic_id(&self) -> bool {
        self.name == MAGIC_ID
    }

    /// The literal used when no explicit default is declared and the column
    /// cannot default to `NULL`.
    ///
    /// This is the converter's default, or the zero of the storage class when
    /// the converter has none (a nullable converter on a `NOT NULL` column).
    pub fn fallback_literal(&self) -> String {
        self.fallback
            .clone()
            .filter(|literal| literal != "NULL")
            .unwrap_or_else(|| {
                match self.sql_type {
                    SqlType::Integer => "0",
                    SqlType::Real => "0.0",
                    SqlType::Text => "''",
                    SqlType::Blob => "X''",
                }
                .to_string()
            })
    }

    /// Literal of the column's `DEFAULT` clause, or `None` when none is
    /// rendered.
    ///
    /// An explicit default always wins. Otherwise key columns get no clause,
    /// nullable columns default to `NULL`, and the rest use
    /// [`fallback_literal`](Self::fallback_literal).
    pub fn default_literal(&self) -> Option<String> {
        if let Some(raw) = &self.default {
            return Some(self.sql_type.render_default(raw));
        }
        if self.key {
            None
        } else if self.nullable {
            Some("NULL".to_string())
        } else {
            Some(self.fallback_literal())
        }
    }

    /// Ordering key: explicit index first, unindexed last, then by name.
    pub(crate) fn sort_key(&self) -> (bool, u32, &str) {
        (
            self.index.is_none(),
            self.index.unwrap_or(u32::MAX),
            self.name.as_str(),
        )
    }
}

/// Plain-data description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Schema version that introduced the table.
    #[serde(default = "default_since")]
    pub since: u32,
    /// Columns in stabilized order.
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The column flagged as natural key.
    pub fn key_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.key)
    }

    /// The column bound to the reserved surrogate key.
    pub fn magic_id_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.is_magic_id())
    }

    /// The natural key if declared, else the surrogate key column if bound.
    pub fn key_or_magic_id_column(&self) -> Option<&ColumnSchema> {
        self.key_column().or_else(|| self.magic_id_column())
    }

    /// Highest `since` of the table or any of its columns.
    pub fn max_since(&self) -> u32 {
        self.columns
            .iter()
            .map(|c| c.since)
            .fold(self.since, u32::max)
    }

    /// Sorts columns into the stable DDL order.
    pub fn sort_columns(&mut self) {
        self.columns
            .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }
}

/// A column bound to a row-model field.
pub struct Column<M> {
    pub(crate) schema: ColumnSchema,
    pub(crate) lens: Option<Lens>,
    pub(crate) get: Getter<M>,
    pub(crate) set: Setter<M>,
}

impl<M> Clone for Column<M> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            lens: self.lens.clone(),
            get: self.get.clone(),
            set: self.set.clone(),
        }
    }
}

impl<M> std::fmt::Debug for Column<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("schema", &self.schema)
            .field("lens", &self.lens)
            .finish_non_exhaustive()
    }
}

impl<M: 'static> Column<M> {
    /// Plain-data shape of the column.
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Bound field name.
    pub fn field(&self) -> &str {
        &self.schema.field
    }

    /// Bound converter, if any.
    pub fn lens(&self) -> Option<&Lens> {
        self.lens.as_ref()
    }

    /// Reads the bound field from `instance`.
    pub fn value<'a>(&self, instance: &'a M) -> &'a dyn Any {
        (self.get)(instance)
    }

    /// Rebinds an ancestor's column onto a descendant that embeds it.
    pub(crate) fn project<D: 'static>(
        &self,
        project: fn(&D) -> &M,
        project_mut: fn(&mut D) -> &mut M,
    ) -> Column<D> {
        let get = self.get.clone();
        let set = self.set.clone();
        Column {
            schema: self.schema.clone(),
            lens: self.lens.clone(),
            get: getter(move |model: &D| get(project(model))),
            set: setter(move |model: &mut D, value: Box<dyn Any>| set(project_mut(model), value)),
        }
    }

    /// Builds a column with no bound converter.
    #[cfg(test)]
    pub(crate) fn without_lens(mut self) -> Self {
        self.lens = None;
        self
    }
}

/// Reflected shape of a row model: its table and bound columns.
///
/// Immutable after construction and shared through the
/// [`Reflector`](crate::Reflector) cache.
pub struct TableDescriptor<M> {
    pub(crate) model: &'static str,
    pub(crate) schema: TableSchema,
    pub(crate) columns: Vec<Column<M>>,
    pub(crate) key: Option<usize>,
    pub(crate) magic_id: Option<usize>,
    pub(crate) constructor: Option<fn() -> M>,
}

impl<M> std::fmt::Debug for TableDescriptor<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableDescriptor")
            .field("model", &self.model)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl<M: 'static> TableDescriptor<M> {
    /// Rust type name of the row model.
    pub fn model(&self) -> &'static str {
        self.model
    }

    /// Plain-data shape of the table.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Table name.
    pub fn table_name(&self) -> &str {
        &self.schema.name
    }

    /// Schema version that introduced the table.
    pub fn since(&self) -> u32 {
        self.schema.since
    }

    /// Columns in stabilized order.
    pub fn columns(&self) -> &[Column<M>] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column<M>> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// The natural key column, if declared.
    pub fn key_column(&self) -> Option<&Column<M>> {
        self.key.map(|i| &self.columns[i])
    }

    /// The column bound to [`MAGIC_ID`], if any.
    pub fn magic_id_column(&self) -> Option<&Column<M>> {
        self.magic_id.map(|i| &self.columns[i])
    }

    /// The natural key if declared, else the surrogate key column.
    pub fn key_or_magic_id_column(&self) -> Option<&Column<M>> {
        self.key_column().or_else(|| self.magic_id_column())
    }
}
