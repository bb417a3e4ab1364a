//! Mapping from Rust value types to their default [`Lens`].

use std::any::{Any, TypeId};
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::lens::Lens;

/// Registry of type-level and field-level converters.
///
/// [`LensRegistry::default`] knows every built-in lens. Applications add
/// their own value types with [`register`](Self::register) and retarget a
/// single field with [`register_override`](Self::register_override).
///
/// # Examples
///
/// ```
/// use lensorm_core::{Lens, LensRegistry};
///
/// let registry = LensRegistry::default();
/// assert_eq!(registry.lens_for::<i32>(), Some(&Lens::I32));
/// assert_eq!(registry.lens_for::<Option<i32>>(), Some(&Lens::NullableI32));
/// assert!(registry.lens_for::<std::path::PathBuf>().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct LensRegistry {
    by_type: HashMap<TypeId, Lens>,
    overrides: HashMap<(TypeId, String), Lens>,
}

impl LensRegistry {
    /// Creates a registry with no mappings at all.
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
            overrides: HashMap::new(),
        }
    }

    /// Maps `T` to `lens`, replacing any previous mapping.
    pub fn register<T: Any>(&mut self, lens: Lens) -> &mut Self {
        self.by_type.insert(TypeId::of::<T>(), lens);
        self
    }

    /// Binds `lens` to `field` of row model `M`, ahead of both the type
    /// default and any lens given in the model's own declaration.
    pub fn register_override<M: Any>(&mut self, field: impl Into<String>, lens: Lens) -> &mut Self {
        self.overrides.insert((TypeId::of::<M>(), field.into()), lens);
        self
    }

    /// Returns the default lens for `T`.
    pub fn lens_for<T: Any>(&self) -> Option<&Lens> {
        self.lens_for_type(TypeId::of::<T>())
    }

    /// Returns the default lens for a value type id.
    pub fn lens_for_type(&self, type_id: TypeId) -> Option<&Lens> {
        self.by_type.get(&type_id)
    }

    /// Returns the field-level override for `field` of the model `model`.
    pub fn override_for(&self, model: TypeId, field: &str) -> Option<&Lens> {
        self.overrides.get(&(model, field.to_string()))
    }

    /// Number of type-level mappings.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Returns `true` if there are no type-level mappings.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl Default for LensRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<bool>(Lens::Bool)
            .register::<Option<bool>>(Lens::NullableBool)
            .register::<i8>(Lens::I8)
            .register::<Option<i8>>(Lens::NullableI8)
            .register::<i16>(Lens::I16)
            .register::<Option<i16>>(Lens::NullableI16)
            .register::<i32>(Lens::I32)
            .register::<Option<i32>>(Lens::NullableI32)
            .register::<i64>(Lens::I64)
            .register::<Option<i64>>(Lens::NullableI64)
            .register::<f32>(Lens::F32)
            .register::<Option<f32>>(Lens::NullableF32)
            .register::<f64>(Lens::F64)
            .register::<Option<f64>>(Lens::NullableF64)
            .register::<char>(Lens::Char)
            .register::<Option<char>>(Lens::NullableChar)
            .register::<String>(Lens::Text)
            .register::<Option<String>>(Lens::NullableText)
            .register::<DateTime<Utc>>(Lens::DateTime)
            .register::<Option<DateTime<Utc>>>(Lens::NullableDateTime)
            .register::<NaiveDateTime>(Lens::NaiveDateTime)
            .register::<Option<NaiveDateTime>>(Lens::NullableNaiveDateTime)
            .register::<NaiveDate>(Lens::Date)
            .register::<Option<NaiveDate>>(Lens::NullableDate)
            .register::<Vec<String>>(Lens::LIST);
        registry
    }
}
