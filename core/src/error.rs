//! Error types for row-model reflection and marshalling.
//!
//! Every variant names the row-model type (and field, where one is
//! involved) because these errors almost always come from a declaration
//! mistake the developer has to fix, not from runtime data.

use thiserror::Error;

use crate::validate::ValidationError;

/// Errors raised while reflecting, converting, or marshalling row models.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The declarative metadata of a row model is inconsistent.
    #[error("schema definition error in {model}{}: {message}", field_suffix(.field))]
    SchemaDefinition {
        /// Row-model type name.
        model: String,
        /// Offending field, if the problem is field-specific.
        field: Option<String>,
        /// Human-readable description.
        message: String,
    },

    /// A field's value type has no registered converter and no override.
    #[error("no converter found for field `{field}` of {model} (value type {value_type})")]
    NoConverterFound {
        /// Row-model type name.
        model: String,
        /// Field name.
        field: String,
        /// Rust type name of the field's value.
        value_type: String,
    },

    /// The engine could not construct or introspect the row model itself.
    #[error("cannot introspect {model}: {message}")]
    Introspection {
        /// Row-model type name.
        model: String,
        /// Human-readable description.
        message: String,
    },

    /// A schema manifest failed structural validation.
    #[error("invalid schema `{schema}`: {}", join_errors(.errors))]
    InvalidSchema {
        /// Schema (database) name.
        schema: String,
        /// Every problem found.
        errors: Vec<ValidationError>,
    },

    /// A stored value could not be converted into the field's type.
    #[error("cannot convert value for column `{column}`: {message}")]
    Conversion {
        /// Column name.
        column: String,
        /// Human-readable description.
        message: String,
    },
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(".{f}"))
        .unwrap_or_default()
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Builds a [`Error::SchemaDefinition`] that is not tied to a field.
    pub fn schema(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaDefinition {
            model: model.into(),
            field: None,
            message: message.into(),
        }
    }

    /// Builds a [`Error::SchemaDefinition`] naming the offending field.
    pub fn field(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SchemaDefinition {
            model: model.into(),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Builds a [`Error::Conversion`].
    pub fn conversion(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for schema definition errors, including the
    /// [`NoConverterFound`](Error::NoConverterFound) specialization.
    pub fn is_schema_definition(&self) -> bool {
        matches!(
            self,
            Self::SchemaDefinition { .. }
                | Self::NoConverterFound { .. }
                | Self::InvalidSchema { .. }
        )
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
