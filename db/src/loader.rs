//! Loading and saving schema files.
//!
//! A schema file is the serialized form of a [`Schema`]: a database name, a
//! target version, and its tables. YAML (`.yml`, `.yaml`) and JSON (`.json`)
//! are supported; the format follows the file extension.
//!
//! ```no_run
//! use lensorm_db::SchemaFile;
//!
//! let file = SchemaFile::load("schema/app.yaml").unwrap();
//! println!("{} v{}", file.schema.name, file.schema.version);
//! ```
//!
//! Loaded schemas are validated and their columns put in the same order the
//! reflector produces (explicit index first, then by name), so DDL generated
//! from a file matches DDL generated from the row models it describes.

use std::path::{Path, PathBuf};

use lensorm_core::Schema;

use crate::error::{DatabaseError, Result};

/// On-disk encoding of a schema file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    /// JSON, pretty-printed on save.
    Json,
    /// YAML.
    Yaml,
}

impl SchemaFormat {
    /// Picks the format from a path's extension.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yml" | "yaml") => Ok(Self::Yaml),
            _ => Err(DatabaseError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Parses and normalizes a schema.
    pub fn parse(self, text: &str) -> Result<Schema> {
        let mut schema: Schema = match self {
            Self::Json => serde_json::from_str(text)?,
            Self::Yaml => serde_yaml::from_str(text)?,
        };
        for table in &mut schema.tables {
            table.sort_columns();
        }
        schema.validate()?;
        Ok(schema)
    }

    /// Serializes a schema.
    pub fn render(self, schema: &Schema) -> Result<String> {
        Ok(match self {
            Self::Json => serde_json::to_string_pretty(schema)?,
            Self::Yaml => serde_yaml::to_string(schema)?,
        })
    }
}

/// A schema together with the file it was loaded from or will be saved to.
#[derive(Debug, Clone)]
pub struct SchemaFile {
    /// File location.
    pub path: PathBuf,
    /// Encoding, derived from the extension.
    pub format: SchemaFormat,
    /// The schema.
    pub schema: Schema,
}

impl SchemaFile {
    /// Pairs `schema` with `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::UnsupportedFormat`] if the extension is not
    /// a schema format.
    pub fn new(path: impl Into<PathBuf>, schema: Schema) -> Result<Self> {
        let path = path.into();
        let format = SchemaFormat::from_path(&path)?;
        Ok(Self {
            path,
            format,
            schema,
        })
    }

    /// Reads, parses, and validates a schema file.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::IoError`] if the file cannot be read, a
    /// JSON/YAML error if it cannot be parsed, and
    /// [`DatabaseError::Schema`] if the schema is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = SchemaFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            schema: format.parse(&text)?,
        })
    }

    /// Writes the schema to [`path`](Self::path).
    pub fn save(&self) -> Result<()> {
        std::fs::write(&self.path, self.format.render(&self.schema)?)?;
        Ok(())
    }

    /// Consumes the file, returning the schema.
    pub fn into_schema(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: shop.db
version: 2
tables:
  - name: orders
    columns:
      - { name: total, type: REAL }
      - { name: code, type: TEXT, key: true }
      - { name: _id, type: INTEGER, nullable: true }
      - { name: note, type: TEXT, nullable: true, since: 2 }
      - { name: placed, type: INTEGER, index: 0 }
"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            SchemaFormat::from_path(Path::new("a/b.json")).unwrap(),
            SchemaFormat::Json
        );
        assert_eq!(
            SchemaFormat::from_path(Path::new("b.yml")).unwrap(),
            SchemaFormat::Yaml
        );
        assert!(matches!(
            SchemaFormat::from_path(Path::new("b.toml")),
            Err(DatabaseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_parse_sorts_columns() {
        let schema = SchemaFormat::Yaml.parse(YAML).unwrap();
        let orders = schema.table("orders").unwrap();
        let names: Vec<&str> = orders.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["placed", "_id", "code", "note", "total"]);
        assert_eq!(orders.since, 1);
        assert_eq!(orders.column("note").unwrap().since, 2);
    }

    #[test]
    fn test_parse_validates() {
        let invalid = YAML.replace("version: 2", "version: 1");
        let err = SchemaFormat::Yaml.parse(&invalid).unwrap_err();
        assert!(matches!(err, DatabaseError::Schema(_)));
        assert!(err.to_string().contains("orders.note"));
    }

    #[test]
    fn test_json_and_yaml_agree() {
        let schema = SchemaFormat::Yaml.parse(YAML).unwrap();
        let json = SchemaFormat::Json.render(&schema).unwrap();
        assert_eq!(SchemaFormat::Json.parse(&json).unwrap(), schema);
    }
}
