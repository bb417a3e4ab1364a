//! Declarative row-model metadata.
//!
//! A row model describes itself once, in [`RowModel::declare`], by
//! registering its columns with accessor/mutator pairs. The
//! [`Reflector`](crate::Reflector) interprets these declarations into a
//! cached [`TableDescriptor`](crate::TableDescriptor).
//!
//! # Example
//!
//! ```
//! use lensorm_core::{ModelDecl, RowModel};
//!
//! #[derive(Default)]
//! struct Person {
//!     id: Option<i64>,
//!     email: String,
//!     nickname: Option<String>,
//!     age: i32,
//! }
//!
//! impl RowModel for Person {
//!     fn declare(model: &mut ModelDecl<Self>) {
//!         model.table("people").default_constructor();
//!         model.column("id", |p| &p.id, |p, v| p.id = v).name("_id");
//!         model.column("email", |p| &p.email, |p, v| p.email = v).key();
//!         model.column("nickname", |p| &p.nickname, |p, v| p.nickname = v);
//!         model.column("age", |p| &p.age, |p, v| p.age = v).since(2);
//!     }
//! }
//! ```

use std::any::{Any, TypeId, type_name};
use std::sync::Arc;

use crate::descriptor::Column;
use crate::error::Result;
use crate::lens::Lens;
use crate::reflect::Reflector;

/// A type whose instances are persisted one-to-one with table rows.
pub trait RowModel: Sized + Send + Sync + 'static {
    /// Registers table and column metadata.
    fn declare(model: &mut ModelDecl<Self>);
}

/// Type-erased field reader.
pub(crate) type Getter<M> = Arc<dyn Fn(&M) -> &(dyn Any + 'static) + Send + Sync>;

/// Type-erased field writer; fails with a description if the boxed value
/// is not of the field's type.
pub(crate) type Setter<M> =
    Arc<dyn Fn(&mut M, Box<dyn Any>) -> std::result::Result<(), String> + Send + Sync>;

pub(crate) fn getter<M, F>(f: F) -> Getter<M>
where
    F: Fn(&M) -> &(dyn Any + 'static) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn setter<M, F>(f: F) -> Setter<M>
where
    F: Fn(&mut M, Box<dyn Any>) -> std::result::Result<(), String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Collects inherited columns from one ancestor model.
type AncestorColumns<M> = Box<dyn Fn(&Reflector) -> Result<Vec<Column<M>>> + Send + Sync>;

/// Column metadata for a single field.
///
/// Returned by [`ModelDecl::column`]; every setter returns `&mut Self` so
/// a declaration reads as one chain.
pub struct ColumnDecl<M> {
    pub(crate) field: String,
    pub(crate) name: Option<String>,
    pub(crate) index: Option<u32>,
    pub(crate) nullable: Option<bool>,
    pub(crate) default: Option<String>,
    pub(crate) since: u32,
    pub(crate) key: bool,
    pub(crate) lens: Option<Lens>,
    pub(crate) value_type: TypeId,
    pub(crate) value_type_name: &'static str,
    pub(crate) get: Getter<M>,
    pub(crate) set: Setter<M>,
}

impl<M> ColumnDecl<M> {
    /// Column name; defaults to the field name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit position. Indexed columns sort before unindexed ones.
    pub fn index(&mut self, index: u32) -> &mut Self {
        self.index = Some(index);
        self
    }

    /// Overrides the nullability implied by the field's lens.
    pub fn nullable(&mut self, nullable: bool) -> &mut Self {
        self.nullable = Some(nullable);
        self
    }

    /// Raw default literal, rendered per the column's SQL type
    /// (`"x"` becomes `'x'` for text, `"7"` stays `7` for integers).
    pub fn default(&mut self, raw: impl Into<String>) -> &mut Self {
        self.default = Some(raw.into());
        self
    }

    /// Schema version that introduced the column.
    pub fn since(&mut self, version: u32) -> &mut Self {
        self.since = version;
        self
    }

    /// Marks the column as the natural key (`UNIQUE NOT NULL`).
    pub fn key(&mut self) -> &mut Self {
        self.key = true;
        self
    }

    /// Uses `lens` instead of the value type's default converter.
    pub fn lens(&mut self, lens: Lens) -> &mut Self {
        self.lens = Some(lens);
        self
    }
}

/// Table-level metadata and the column declarations of a row model.
pub struct ModelDecl<M> {
    pub(crate) table: Option<String>,
    pub(crate) since: Option<u32>,
    pub(crate) constructor: Option<fn() -> M>,
    pub(crate) columns: Vec<ColumnDecl<M>>,
    pub(crate) ancestors: Vec<AncestorColumns<M>>,
    pub(crate) ignored: Vec<String>,
}

impl<M: RowModel> ModelDecl<M> {
    pub(crate) fn new() -> Self {
        Self {
            table: None,
            since: None,
            constructor: None,
            columns: Vec::new(),
            ancestors: Vec::new(),
            ignored: Vec::new(),
        }
    }

    /// Table name; defaults to the lower-cased type name.
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.table = Some(name.into());
        self
    }

    /// Schema version that introduced the table; defaults to 1.
    pub fn since(&mut self, version: u32) -> &mut Self {
        self.since = Some(version);
        self
    }

    /// Zero-argument constructor used when materializing rows.
    pub fn constructor(&mut self, constructor: fn() -> M) -> &mut Self {
        self.constructor = Some(constructor);
        self
    }

    /// Uses [`Default::default`] as the constructor.
    pub fn default_constructor(&mut self) -> &mut Self
    where
        M: Default,
    {
        self.constructor(M::default)
    }

    /// Declares a column bound to `field`.
    ///
    /// `get` and `set` are the only way the engine touches the field.
    pub fn column<V: Any>(
        &mut self,
        field: impl Into<String>,
        get: fn(&M) -> &V,
        set: fn(&mut M, V),
    ) -> &mut ColumnDecl<M> {
        self.columns.push(ColumnDecl {
            field: field.into(),
            name: None,
            index: None,
            nullable: None,
            default: None,
            since: 1,
            key: false,
            lens: None,
            value_type: TypeId::of::<V>(),
            value_type_name: type_name::<V>(),
            get: getter(move |model: &M| get(model) as &(dyn Any + 'static)),
            set: setter(move |model: &mut M, value: Box<dyn Any>| {
                let value = value
                    .downcast::<V>()
                    .map_err(|_| format!("expected a value of type {}", type_name::<V>()))?;
                set(model, *value);
                Ok(())
            }),
        });
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Inherits every column of the ancestor model `P`, which `M` embeds.
    ///
    /// Columns declared on `M` with the same name replace the inherited
    /// ones, including their `since` version.
    pub fn inherit<P: RowModel>(
        &mut self,
        project: fn(&M) -> &P,
        project_mut: fn(&mut M) -> &mut P,
    ) -> &mut Self {
        self.ancestors.push(Box::new(move |reflector: &Reflector| {
            let parent = reflector.reflect::<P>()?;
            Ok(parent
                .columns()
                .iter()
                .map(|column| column.project(project, project_mut))
                .collect())
        }));
        self
    }

    /// Excludes `field` from the table, whether declared here or inherited.
    pub fn ignore(&mut self, field: impl Into<String>) -> &mut Self {
        self.ignored.push(field.into());
        self
    }
}
