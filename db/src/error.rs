//! Error types for schema file and manifest operations.

use thiserror::Error;

/// Errors that can occur while loading, saving, or fingerprinting schemas.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The schema itself is invalid.
    #[error(transparent)]
    Schema(#[from] lensorm_core::Error),

    /// The file extension maps to no known schema format.
    #[error("unsupported schema format: {0}")]
    UnsupportedFormat(String),

    /// Manifest belongs to another schema or is otherwise unusable.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// The tables changed but the schema version did not.
    #[error(
        "schema `{schema}` version {version} was recorded with fingerprint {recorded} \
         but now hashes to {actual}; bump the version to migrate existing databases"
    )]
    FingerprintMismatch {
        /// Schema (database) name.
        schema: String,
        /// Schema version both fingerprints belong to.
        version: u32,
        /// Fingerprint stored in the manifest.
        recorded: String,
        /// Fingerprint of the schema as loaded now.
        actual: String,
    },
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
