//! Row-model reflection, type converters, and row marshalling.
//!
//! This crate is the store-independent half of lensorm:
//!
//! - [`Lens`]: converters between Rust field values and [`SqlValue`]s,
//!   looked up per value type in a [`LensRegistry`].
//! - [`RowModel`] / [`ModelDecl`]: declarative table and column metadata
//!   with accessor closures for every persisted field.
//! - [`Reflector`]: turns declarations into cached [`TableDescriptor`]s,
//!   merging inherited columns and ordering them deterministically.
//! - Row marshalling ([`TableDescriptor::to_row`],
//!   [`TableDescriptor::from_row`]) and statement text
//!   ([`TableDescriptor::insert_statement`] and friends).
//! - [`Schema`]: the serializable manifest of one database's tables at a
//!   version, validated by [`validate_schema`].
//!
//! # Example
//!
//! ```
//! use lensorm_core::*;
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Person {
//!     id: Option<i64>,
//!     email: String,
//!     age: Option<i32>,
//! }
//!
//! impl RowModel for Person {
//!     fn declare(model: &mut ModelDecl<Self>) {
//!         model.table("people").default_constructor();
//!         model.column("id", |p| &p.id, |p, v| p.id = v).name(MAGIC_ID);
//!         model.column("email", |p| &p.email, |p, v| p.email = v).key();
//!         model.column("age", |p| &p.age, |p, v| p.age = v).since(2);
//!     }
//! }
//!
//! let reflector = Reflector::default();
//! let people = reflector.reflect::<Person>()?;
//! assert_eq!(people.key_or_magic_id_column().unwrap().name(), "email");
//!
//! let alice = Person { id: None, email: "alice@example.com".into(), age: Some(30) };
//! let row = people.to_row(&alice)?;
//! assert_eq!(people.from_row(&row)?, alice);
//!
//! let delete = people.delete_statement(&alice)?;
//! assert_eq!(delete.sql, "DELETE FROM people WHERE email = 'alice@example.com'");
//! # Ok::<(), Error>(())
//! ```

mod descriptor;
mod error;
mod lens;
mod marshal;
mod model;
mod reflect;
mod registry;
mod schema;
mod statement;
mod validate;
mod value;

pub use descriptor::{Column, ColumnSchema, MAGIC_ID, TableDescriptor, TableSchema};
pub use error::{Error, Result};
pub use lens::{
    ColumnValue, CustomLens, LIST_DELIMITER, Lens, TextEnumLens, UNIT_SEPARATOR,
};
pub use model::{ColumnDecl, ModelDecl, RowModel};
pub use reflect::{DescriptorCache, Reflector};
pub use registry::LensRegistry;
pub use schema::{Schema, SchemaBuilder};
pub use statement::Statement;
pub use validate::{ValidationError, is_valid_identifier, validate_schema, validate_table};
pub use value::{RowCursor, RowValues, SqlType, SqlValue};
