//! Schema files and fingerprint manifests for lensorm.
//!
//! - [`SchemaFile`] loads and saves a [`Schema`](lensorm_core::Schema) as
//!   YAML or JSON, validating and normalizing it on the way in.
//! - [`fingerprint`] hashes the DDL-relevant shape of a schema.
//! - [`Manifest`] records one fingerprint per schema version and flags
//!   tables that changed without a version bump.
//!
//! # Quick start
//!
//! ```no_run
//! use lensorm_db::{Manifest, SchemaFile};
//!
//! let file = SchemaFile::load("schema/app.yaml").unwrap();
//! let manifest = Manifest::load_or_new("schema/manifest.json", &file.schema.name).unwrap();
//! manifest.check(&file.schema).unwrap();
//! ```

mod error;
mod loader;
mod manifest;

pub use error::{DatabaseError, Result};
pub use loader::{SchemaFile, SchemaFormat};
pub use manifest::{Manifest, fingerprint};
