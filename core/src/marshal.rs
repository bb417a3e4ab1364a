//! Row marshalling between row-model instances and key-value rows.

use tracing::warn;

use crate::descriptor::{Column, TableDescriptor};
use crate::error::{Error, Result};
use crate::value::{RowCursor, RowValues, SqlValue};

impl<M: 'static> TableDescriptor<M> {
    /// Builds an empty instance with the declared constructor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Introspection`] if the model declares no constructor.
    pub fn new_instance(&self) -> Result<M> {
        let constructor = self.constructor.ok_or_else(|| Error::Introspection {
            model: self.model.to_string(),
            message: "no zero-argument constructor declared".to_string(),
        })?;
        Ok(constructor())
    }

    /// Encodes every column of `instance` into a key-value row.
    ///
    /// Columns without a converter are skipped with a warning; the returned
    /// row is then shorter than the column list.
    pub fn to_row(&self, instance: &M) -> Result<RowValues> {
        let mut row = RowValues::new();
        for column in &self.columns {
            let Some(lens) = column.lens() else {
                warn!(
                    model = self.model,
                    column = column.name(),
                    "skipping column without a converter"
                );
                continue;
            };
            lens.write(column.name(), column.value(instance), &mut row)?;
        }
        Ok(row)
    }

    /// Materializes an instance from one row.
    ///
    /// # Errors
    ///
    /// - [`Error::Introspection`] if no constructor is declared.
    /// - [`Error::SchemaDefinition`] if a column has no converter or its
    ///   decoded value cannot be assigned to the bound field.
    /// - [`Error::Conversion`] if a stored value does not fit the field type.
    pub fn from_row(&self, row: &dyn RowCursor) -> Result<M> {
        let mut instance = self.new_instance()?;
        for column in &self.columns {
            let lens = self.require_lens(column)?;
            let value = lens.read(column.name(), row)?;
            (column.set)(&mut instance, value).map_err(|cause| {
                Error::field(
                    self.model,
                    column.field(),
                    format!("field is not assignable: {cause}"),
                )
            })?;
        }
        Ok(instance)
    }

    /// Writes a store-assigned surrogate key into the field bound to
    /// [`MAGIC_ID`](crate::MAGIC_ID).
    ///
    /// Returns `false` if the model binds no field to the surrogate key.
    pub fn set_magic_id(&self, instance: &mut M, id: i64) -> Result<bool> {
        let Some(column) = self.magic_id_column() else {
            return Ok(false);
        };
        let value = self
            .require_lens(column)?
            .decode(column.name(), SqlValue::Integer(id))?;
        (column.set)(instance, value).map_err(|cause| {
            Error::field(
                self.model,
                column.field(),
                format!("field is not assignable: {cause}"),
            )
        })?;
        Ok(true)
    }

    /// Renders the current value of `column` in `instance` as an SQL literal.
    pub fn column_value_literal(&self, instance: &M, column: &Column<M>) -> Result<String> {
        self.require_lens(column)?
            .literal(column.name(), column.value(instance))
    }

    fn require_lens<'c>(&self, column: &'c Column<M>) -> Result<&'c crate::lens::Lens> {
        column.lens().ok_or_else(|| {
            Error::field(
                self.model,
                column.field(),
                format!("column `{}` has no converter", column.name()),
            )
        })
    }
}
