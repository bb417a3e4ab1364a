//! Schema fingerprints and the fingerprint manifest.
//!
//! Migrations only run when the schema version changes. Editing a table but
//! forgetting to bump the version leaves existing databases silently stale.
//! The manifest records one fingerprint per released version so that this
//! mistake is caught before any database is opened:
//!
//! ```no_run
//! use lensorm_db::{Manifest, SchemaFile};
//!
//! let schema = SchemaFile::load("schema/app.yaml").unwrap().into_schema();
//! let mut manifest = Manifest::load_or_new("schema/manifest.json", &schema.name).unwrap();
//! manifest.check(&schema).unwrap();
//! manifest.record(&schema);
//! manifest.save("schema/manifest.json").unwrap();
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use lensorm_core::{Schema, SqlType, TableSchema};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DatabaseError, Result};

/// DDL-relevant projection of a column. Field bindings and converter names
/// do not change the database and are left out.
#[derive(Serialize)]
struct CanonicalColumn<'a> {
    name: &'a str,
    sql_type: SqlType,
    since: u32,
    nullable: bool,
    key: bool,
    default: Option<String>,
}

#[derive(Serialize)]
struct CanonicalTable<'a> {
    name: &'a str,
    since: u32,
    columns: Vec<CanonicalColumn<'a>>,
}

impl<'a> From<&'a TableSchema> for CanonicalTable<'a> {
    fn from(table: &'a TableSchema) -> Self {
        Self {
            name: &table.name,
            since: table.since,
            columns: table
                .columns
                .iter()
                .map(|c| CanonicalColumn {
                    name: &c.name,
                    sql_type: c.sql_type,
                    since: c.since,
                    nullable: c.nullable,
                    key: c.key,
                    default: c.default_literal(),
                })
                .collect(),
        }
    }
}

/// SHA-256 hex digest of the canonical JSON form of `schema`'s tables.
///
/// Two schemas that generate the same DDL hash the same, whether they were
/// reflected from row models or loaded from a file.
///
/// # Examples
///
/// ```
/// use lensorm_core::{ColumnSchema, Schema, SqlType, TableSchema};
/// use lensorm_db::fingerprint;
///
/// let mut schema = Schema {
///     name: "app.db".into(),
///     version: 1,
///     tables: vec![TableSchema {
///         name: "notes".into(),
///         since: 1,
///         columns: vec![ColumnSchema::new("body", SqlType::Text)],
///     }],
/// };
/// let before = fingerprint(&schema);
/// assert_eq!(before.len(), 64);
///
/// schema.tables[0].columns[0].nullable = true;
/// assert_ne!(fingerprint(&schema), before);
/// ```
pub fn fingerprint(schema: &Schema) -> String {
    let tables: Vec<CanonicalTable<'_>> = schema.tables.iter().map(CanonicalTable::from).collect();
    // Plain structs of strings and integers always serialize.
    let bytes = serde_json::to_vec(&tables).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

/// Fingerprints of every recorded version of one schema.
///
/// Persisted as pretty-printed JSON next to the schema file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema (database) name the fingerprints belong to.
    pub schema: String,
    /// Manifest format version.
    pub version: String,
    /// RFC 3339 timestamp of the last change.
    pub updated_at: String,
    /// Fingerprint per schema version.
    pub fingerprints: BTreeMap<u32, String>,
}

impl Manifest {
    /// Creates an empty manifest for `schema`.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            version: "1.0".to_string(),
            updated_at: now_rfc3339(),
            fingerprints: BTreeMap::new(),
        }
    }

    /// Loads a manifest from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, or [`JsonError`](crate::DatabaseError::JsonError) if the
    /// content is not valid manifest JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let manifest = serde_json::from_reader(BufReader::new(file))?;
        Ok(manifest)
    }

    /// Loads the manifest at `path`, or starts an empty one if the file does
    /// not exist yet.
    pub fn load_or_new(path: impl AsRef<Path>, schema: &str) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new(schema))
        }
    }

    /// Saves the manifest as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Fingerprint recorded for `version`.
    pub fn get(&self, version: u32) -> Option<&str> {
        self.fingerprints.get(&version).map(String::as_str)
    }

    /// Returns `true` if a fingerprint is recorded for `version`.
    pub fn contains(&self, version: u32) -> bool {
        self.fingerprints.contains_key(&version)
    }

    /// Highest recorded version.
    pub fn latest(&self) -> Option<u32> {
        self.fingerprints.keys().next_back().copied()
    }

    /// Verifies that `schema` still hashes to the fingerprint recorded for
    /// its version. An unrecorded version passes.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::InvalidManifest`] if the manifest belongs to
    ///   another schema.
    /// - [`DatabaseError::FingerprintMismatch`] if the tables changed without
    ///   a version bump.
    pub fn check(&self, schema: &Schema) -> Result<()> {
        if self.schema != schema.name {
            return Err(DatabaseError::InvalidManifest(format!(
                "manifest is for `{}`, not `{}`",
                self.schema, schema.name
            )));
        }
        let actual = fingerprint(schema);
        match self.get(schema.version) {
            Some(recorded) if recorded != actual => Err(DatabaseError::FingerprintMismatch {
                schema: schema.name.clone(),
                version: schema.version,
                recorded: recorded.to_string(),
                actual,
            }),
            _ => Ok(()),
        }
    }

    /// Records the fingerprint of `schema` at its version.
    ///
    /// Returns `true` if the manifest changed.
    pub fn record(&mut self, schema: &Schema) -> bool {
        let actual = fingerprint(schema);
        if self.get(schema.version) == Some(actual.as_str()) {
            return false;
        }
        self.fingerprints.insert(schema.version, actual);
        self.updated_at = now_rfc3339();
        true
    }

    /// Versions whose fingerprints differ between `self` and `other`,
    /// including versions recorded in only one of them.
    pub fn diff(&self, other: &Manifest) -> Vec<u32> {
        let mut changed: Vec<u32> = self
            .fingerprints
            .iter()
            .filter(|&(version, fp)| other.fingerprints.get(version) != Some(fp))
            .map(|(version, _)| *version)
            .collect();
        changed.extend(
            other
                .fingerprints
                .keys()
                .filter(|version| !self.fingerprints.contains_key(*version)),
        );
        changed.sort_unstable();
        changed
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensorm_core::ColumnSchema;

    fn schema(version: u32, nullable: bool) -> Schema {
        let mut body = ColumnSchema::new("body", SqlType::Text);
        body.nullable = nullable;
        Schema {
            name: "app.db".into(),
            version,
            tables: vec![TableSchema {
                name: "notes".into(),
                since: 1,
                columns: vec![body],
            }],
        }
    }

    #[test]
    fn test_fingerprint_ignores_bindings() {
        let plain = schema(1, false);
        let mut bound = plain.clone();
        bound.tables[0].columns[0].field = "body_text".into();
        bound.tables[0].columns[0].lens = "text".into();
        assert_eq!(fingerprint(&plain), fingerprint(&bound));
        // The version is not part of the fingerprint.
        assert_eq!(fingerprint(&plain), fingerprint(&schema(2, false)));
    }

    #[test]
    fn test_check_and_record() {
        let mut manifest = Manifest::new("app.db");
        let v1 = schema(1, false);
        assert!(manifest.check(&v1).is_ok());
        assert!(manifest.record(&v1));
        assert!(!manifest.record(&v1));
        assert_eq!(manifest.latest(), Some(1));

        let edited = schema(1, true);
        let err = manifest.check(&edited).unwrap_err();
        assert!(matches!(err, DatabaseError::FingerprintMismatch { version: 1, .. }));

        let bumped = schema(2, true);
        assert!(manifest.check(&bumped).is_ok());
        manifest.record(&bumped);
        assert_eq!(manifest.latest(), Some(2));
    }

    #[test]
    fn test_check_rejects_foreign_manifest() {
        let manifest = Manifest::new("other.db");
        assert!(matches!(
            manifest.check(&schema(1, false)),
            Err(DatabaseError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_diff() {
        let mut old = Manifest::new("app.db");
        old.record(&schema(1, false));
        let mut new = old.clone();
        assert!(old.diff(&new).is_empty());

        new.record(&schema(2, true));
        new.fingerprints.insert(1, "edited".into());
        assert_eq!(old.diff(&new), vec![1, 2]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let fresh = Manifest::load_or_new(&path, "app.db").unwrap();
        assert!(fresh.fingerprints.is_empty());

        let mut manifest = fresh;
        manifest.record(&schema(3, false));
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.contains(3));
    }
}
