//! Metadata reflection and the descriptor cache.
//!
//! [`Reflector::reflect`] interprets a row model's declarations into a
//! [`TableDescriptor`]:
//!
//! 1. Collect inherited columns from each declared ancestor, in order.
//! 2. Bind every declared column to a lens: a registry field override,
//!    else the lens given in the declaration, else the value type's default.
//!    A field with none fails with [`Error::NoConverterFound`].
//! 3. Replace inherited columns that share a name with a declared column.
//! 4. Drop ignored fields.
//! 5. Order columns by explicit index (unindexed last), then by name.
//! 6. Validate the resulting shape.
//!
//! Descriptors are memoized per type in a [`DescriptorCache`] and shared as
//! `Arc`s. Concurrent first use of one type may reflect it more than once,
//! but only the first finished descriptor is published and every caller gets
//! that same instance.

use std::any::{Any, TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::descriptor::{Column, ColumnSchema, TableDescriptor, TableSchema};
use crate::error::{Error, Result};
use crate::lens::Lens;
use crate::model::{ColumnDecl, ModelDecl, RowModel};
use crate::registry::LensRegistry;
use crate::validate::validate_table;

/// Process-lifetime cache of reflected descriptors, keyed by row-model type.
///
/// Entries are never evicted; the set of row models is fixed at startup.
#[derive(Default)]
pub struct DescriptorCache {
    entries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl DescriptorCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached descriptor of `M`, if reflected already.
    pub fn get<M: 'static>(&self) -> Option<Arc<TableDescriptor<M>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&TypeId::of::<M>())
            .and_then(|entry| Arc::clone(entry).downcast::<TableDescriptor<M>>().ok())
    }

    /// Publishes `descriptor` unless another one for `M` got there first,
    /// and returns whichever is cached.
    fn publish<M: 'static>(&self, descriptor: TableDescriptor<M>) -> Option<Arc<TableDescriptor<M>>> {
        let descriptor: Arc<dyn Any + Send + Sync> = Arc::new(descriptor);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(TypeId::of::<M>()).or_insert(descriptor);
        Arc::clone(entry).downcast::<TableDescriptor<M>>().ok()
    }

    /// Returns `true` if `M` has been reflected.
    pub fn contains<M: 'static>(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<M>())
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been reflected yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("len", &self.len())
            .finish()
    }
}

/// Builds and memoizes table descriptors.
///
/// Create one per process (or per engine) and share it behind an `Arc`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use lensorm_core::{ModelDecl, Reflector, RowModel};
///
/// #[derive(Default)]
/// struct Tag {
///     label: String,
/// }
///
/// impl RowModel for Tag {
///     fn declare(model: &mut ModelDecl<Self>) {
///         model.column("label", |t| &t.label, |t, v| t.label = v).key();
///     }
/// }
///
/// let reflector = Reflector::default();
/// let first = reflector.reflect::<Tag>().unwrap();
/// let second = reflector.reflect::<Tag>().unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(first.table_name(), "tag");
/// ```
#[derive(Debug, Default)]
pub struct Reflector {
    registry: LensRegistry,
    cache: DescriptorCache,
}

impl Reflector {
    /// Creates a reflector resolving lenses through `registry`.
    pub fn new(registry: LensRegistry) -> Self {
        Self {
            registry,
            cache: DescriptorCache::new(),
        }
    }

    /// The lens registry in use.
    pub fn registry(&self) -> &LensRegistry {
        &self.registry
    }

    /// The descriptor cache.
    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Returns the descriptor of `M`, reflecting it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConverterFound`] for a field without a lens and
    /// [`Error::SchemaDefinition`] for inconsistent metadata (duplicate
    /// columns, several keys, invalid names).
    pub fn reflect<M: RowModel>(&self) -> Result<Arc<TableDescriptor<M>>> {
        if let Some(descriptor) = self.cache.get::<M>() {
            return Ok(descriptor);
        }

        let descriptor = self.build::<M>()?;
        debug!(
            model = descriptor.model(),
            table = descriptor.table_name(),
            columns = descriptor.columns().len(),
            "reflected row model"
        );
        self.cache.publish(descriptor).ok_or_else(|| Error::Introspection {
            model: type_name::<M>().to_string(),
            message: "descriptor cache holds an entry of another type".to_string(),
        })
    }

    fn build<M: RowModel>(&self) -> Result<TableDescriptor<M>> {
        let model = type_name::<M>();
        let mut decl = ModelDecl::<M>::new();
        M::declare(&mut decl);

        let mut columns: Vec<Column<M>> = Vec::new();
        for ancestor in &decl.ancestors {
            for column in ancestor(self)? {
                merge_column(&mut columns, column);
            }
        }

        let mut declared: HashSet<String> = HashSet::new();
        for column_decl in decl.columns {
            let column = self.bind_column(model, column_decl)?;
            if !declared.insert(column.name().to_string()) {
                return Err(Error::field(
                    model,
                    column.field(),
                    format!("column `{}` is declared more than once", column.name()),
                ));
            }
            merge_column(&mut columns, column);
        }

        columns.retain(|column| !decl.ignored.iter().any(|f| f == column.field()));
        columns.sort_by(|a, b| a.schema.sort_key().cmp(&b.schema.sort_key()));

        let schema = TableSchema {
            name: decl
                .table
                .unwrap_or_else(|| default_table_name(model)),
            since: decl.since.unwrap_or(1),
            columns: columns.iter().map(|c| c.schema.clone()).collect(),
        };

        let errors = validate_table(&schema);
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::schema(model, message));
        }

        let key = columns.iter().position(|c| c.schema.key);
        let magic_id = columns.iter().position(|c| c.schema.is_magic_id());

        Ok(TableDescriptor {
            model,
            schema,
            columns,
            key,
            magic_id,
            constructor: decl.constructor,
        })
    }

    fn bind_column<M: RowModel>(&self, model: &str, decl: ColumnDecl<M>) -> Result<Column<M>> {
        let lens = self.resolve_lens::<M>(model, &decl)?;
        let name = decl.name.unwrap_or_else(|| decl.field.clone());
        let nullable = decl.nullable.unwrap_or_else(|| lens.is_nullable());

        Ok(Column {
            schema: ColumnSchema {
                name,
                field: decl.field,
                sql_type: lens.sql_type(),
                since: decl.since,
                nullable,
                key: decl.key,
                index: decl.index,
                default: decl.default,
                fallback: Some(lens.default_literal()),
                lens: lens.name().to_string(),
            },
            lens: Some(lens),
            get: decl.get,
            set: decl.set,
        })
    }

    fn resolve_lens<M: RowModel>(&self, model: &str, decl: &ColumnDecl<M>) -> Result<Lens> {
        self.registry
            .override_for(TypeId::of::<M>(), &decl.field)
            .or(decl.lens.as_ref())
            .or_else(|| self.registry.lens_for_type(decl.value_type))
            .cloned()
            .ok_or_else(|| Error::NoConverterFound {
                model: model.to_string(),
                field: decl.field.clone(),
                value_type: decl.value_type_name.to_string(),
            })
    }
}

/// Replaces a same-named column or appends.
fn merge_column<M>(columns: &mut Vec<Column<M>>, column: Column<M>) {
    match columns.iter().position(|c| c.schema.name == column.schema.name) {
        Some(index) => columns[index] = column,
        None => columns.push(column),
    }
}

/// Lower-cased last path segment of a type name, without generics.
fn default_table_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::")
        .next()
        .unwrap_or(base)
        .to_lowercase()
}
