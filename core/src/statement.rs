//! INSERT / UPDATE / SELECT / DELETE statement text.
//!
//! Values written by INSERT and UPDATE travel as `?` parameters in column
//! order. Key predicates embed the key's literal, rendered by the same
//! converter rules as DDL defaults.

use std::any::Any;
use std::fmt;

use crate::descriptor::{Column, MAGIC_ID, TableDescriptor};
use crate::error::{Error, Result};
use crate::value::SqlValue;

/// Statement text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Values for the placeholders, in order.
    pub params: Vec<SqlValue>,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl<M: 'static> TableDescriptor<M> {
    /// `INSERT` for `instance`. The surrogate key is left to the store.
    pub fn insert_statement(&self, instance: &M) -> Result<Statement> {
        let mut row = self.to_row(instance)?;
        row.remove(MAGIC_ID);

        if row.is_empty() {
            return Ok(Statement::new(format!(
                "INSERT INTO {} DEFAULT VALUES",
                self.table_name()
            )));
        }

        let (names, params): (Vec<&str>, Vec<SqlValue>) =
            row.iter().map(|(name, value)| (name, value.clone())).unzip();
        let placeholders = vec!["?"; names.len()].join(", ");
        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                self.table_name(),
                names.join(", ")
            ),
            params,
        })
    }

    /// `UPDATE` of every stored column, matched on the key-or-magic-id column.
    pub fn update_statement(&self, instance: &M) -> Result<Statement> {
        let predicate = self.instance_predicate(instance)?;
        let mut row = self.to_row(instance)?;
        row.remove(MAGIC_ID);

        if row.is_empty() {
            return Err(Error::schema(self.model, "no columns to update"));
        }

        let (assignments, params): (Vec<String>, Vec<SqlValue>) = row
            .iter()
            .map(|(name, value)| (format!("{name} = ?"), value.clone()))
            .unzip();
        Ok(Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {predicate}",
                self.table_name(),
                assignments.join(", ")
            ),
            params,
        })
    }

    /// `DELETE` matched on the key-or-magic-id column of `instance`.
    pub fn delete_statement(&self, instance: &M) -> Result<Statement> {
        let predicate = self.instance_predicate(instance)?;
        Ok(Statement::new(format!(
            "DELETE FROM {} WHERE {predicate}",
            self.table_name()
        )))
    }

    /// `SELECT` of the row whose key-or-magic-id column equals `key`.
    ///
    /// `key` must be of the key field's type.
    pub fn select_by_key_statement(&self, key: &dyn Any) -> Result<Statement> {
        let column = self.require_key_column()?;
        let lens = column.lens().ok_or_else(|| {
            Error::field(self.model, column.field(), "key column has no converter")
        })?;
        let literal = lens.literal(column.name(), key)?;
        Ok(Statement::new(format!(
            "SELECT * FROM {} WHERE {} = {literal}",
            self.table_name(),
            column.name()
        )))
    }

    /// `SELECT` of the row with surrogate key `id`.
    pub fn select_by_id_statement(&self, id: i64) -> Statement {
        Statement::new(format!(
            "SELECT * FROM {} WHERE {MAGIC_ID} = {id}",
            self.table_name()
        ))
    }

    /// `SELECT` of every row.
    pub fn select_all_statement(&self) -> Statement {
        Statement::new(format!("SELECT * FROM {}", self.table_name()))
    }

    fn require_key_column(&self) -> Result<&Column<M>> {
        self.key_or_magic_id_column().ok_or_else(|| {
            Error::schema(self.model, "neither a key nor a surrogate key column is declared")
        })
    }

    fn instance_predicate(&self, instance: &M) -> Result<String> {
        let column = self.require_key_column()?;
        let literal = self.column_value_literal(instance, column)?;
        // `= NULL` never matches.
        if literal == "NULL" {
            return Err(Error::field(
                self.model,
                column.field(),
                format!("key column `{}` has no value assigned", column.name()),
            ));
        }
        Ok(format!("{} = {literal}", column.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDecl, RowModel};
    use crate::reflect::Reflector;

    #[derive(Default)]
    struct User {
        id: Option<i64>,
        login: String,
        age: i32,
        bio: Option<String>,
    }

    impl RowModel for User {
        fn declare(model: &mut ModelDecl<Self>) {
            model.table("users").default_constructor();
            model.column("id", |u| &u.id, |u, v| u.id = v).name(MAGIC_ID);
            model.column("login", |u| &u.login, |u, v| u.login = v).key();
            model.column("age", |u| &u.age, |u, v| u.age = v);
            model.column("bio", |u| &u.bio, |u, v| u.bio = v);
        }
    }

    #[derive(Default)]
    struct Event {
        id: Option<i64>,
        kind: String,
    }

    impl RowModel for Event {
        fn declare(model: &mut ModelDecl<Self>) {
            model.default_constructor();
            model.column("id", |e| &e.id, |e, v| e.id = v).name(MAGIC_ID);
            model.column("kind", |e| &e.kind, |e, v| e.kind = v);
        }
    }

    #[derive(Default)]
    struct Loose {
        note: String,
    }

    impl RowModel for Loose {
        fn declare(model: &mut ModelDecl<Self>) {
            model.default_constructor();
            model.column("note", |l| &l.note, |l, v| l.note = v);
        }
    }

    #[derive(Default)]
    struct Bare {
        id: Option<i64>,
    }

    impl RowModel for Bare {
        fn declare(model: &mut ModelDecl<Self>) {
            model.default_constructor();
            model.column("id", |b| &b.id, |b, v| b.id = v).name(MAGIC_ID);
        }
    }

    fn user() -> User {
        User {
            id: Some(7),
            login: "o'neil".into(),
            age: 40,
            bio: None,
        }
    }

    #[test]
    fn test_insert_excludes_surrogate_key() {
        let users = Reflector::default().reflect::<User>().unwrap();
        let statement = users.insert_statement(&user()).unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO users (age, bio, login) VALUES (?, ?, ?)"
        );
        assert_eq!(
            statement.params,
            vec![
                SqlValue::Integer(40),
                SqlValue::Null,
                SqlValue::Text("o'neil".into())
            ]
        );
    }

    #[test]
    fn test_insert_default_values() {
        let bare = Reflector::default().reflect::<Bare>().unwrap();
        let statement = bare.insert_statement(&Bare::default()).unwrap();
        assert_eq!(statement.sql, "INSERT INTO bare DEFAULT VALUES");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_update_and_delete_use_natural_key() {
        let users = Reflector::default().reflect::<User>().unwrap();
        let update = users.update_statement(&user()).unwrap();
        assert_eq!(
            update.sql,
            "UPDATE users SET age = ?, bio = ?, login = ? WHERE login = 'o''neil'"
        );
        assert_eq!(update.params.len(), 3);

        let delete = users.delete_statement(&user()).unwrap();
        assert_eq!(delete.to_string(), "DELETE FROM users WHERE login = 'o''neil'");
    }

    #[test]
    fn test_surrogate_key_predicates() {
        let events = Reflector::default().reflect::<Event>().unwrap();
        let event = Event {
            id: Some(12),
            kind: "open".into(),
        };
        assert_eq!(
            events.delete_statement(&event).unwrap().sql,
            "DELETE FROM event WHERE _id = 12"
        );
        assert_eq!(
            events.select_by_key_statement(&Some(12i64)).unwrap().sql,
            "SELECT * FROM event WHERE _id = 12"
        );
        assert_eq!(
            events.select_by_id_statement(12).sql,
            "SELECT * FROM event WHERE _id = 12"
        );
        assert_eq!(events.select_all_statement().sql, "SELECT * FROM event");
    }

    #[test]
    fn test_unassigned_surrogate_key_is_rejected() {
        let events = Reflector::default().reflect::<Event>().unwrap();
        let pending = Event {
            id: None,
            kind: "open".into(),
        };
        let err = events.update_statement(&pending).unwrap_err();
        assert!(err.is_schema_definition());
        assert!(err.to_string().contains("no value assigned"));
        assert!(events.delete_statement(&pending).unwrap_err().is_schema_definition());
    }

    #[test]
    fn test_select_by_key_type_mismatch() {
        let users = Reflector::default().reflect::<User>().unwrap();
        assert_eq!(
            users.select_by_key_statement(&"o'neil".to_string()).unwrap().sql,
            "SELECT * FROM users WHERE login = 'o''neil'"
        );
        let err = users.select_by_key_statement(&5i32).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    fn test_keyless_model_rejects_keyed_statements() {
        let loose = Reflector::default().reflect::<Loose>().unwrap();
        let instance = Loose::default();
        assert!(loose.update_statement(&instance).unwrap_err().is_schema_definition());
        assert!(loose.delete_statement(&instance).unwrap_err().is_schema_definition());
        assert!(loose.select_by_key_statement(&"x".to_string()).is_err());
        assert!(loose.insert_statement(&instance).is_ok());
    }

    #[test]
    fn test_update_without_columns() {
        let bare = Reflector::default().reflect::<Bare>().unwrap();
        let err = bare.update_statement(&Bare { id: Some(1) }).unwrap_err();
        assert!(err.to_string().contains("no columns to update"));
    }
}
