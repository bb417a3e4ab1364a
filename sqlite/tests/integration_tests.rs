//! Integration tests for the lensorm-sqlite crate.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lensorm_core::{
    Lens, LensRegistry, MAGIC_ID, ModelDecl, Reflector, RowModel, Schema, TextEnumLens,
};
use lensorm_sqlite::{
    Database, Migration, MigrationOutcome, SqliteError, plan_create_at, plan_upgrade,
};
use rusqlite::Connection;

// ---------------------------------------------------------------------------
// Row models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum Status {
    #[default]
    Draft,
    Published,
}

fn status_lens() -> Lens {
    Lens::Custom(Arc::new(TextEnumLens::new(
        "status",
        Status::Draft,
        |s| match s {
            Status::Draft => "draft",
            Status::Published => "published",
        },
        |s| match s {
            "draft" => Some(Status::Draft),
            "published" => Some(Status::Published),
            _ => None,
        },
    )))
}

/// Columns shared by every document kind.
#[derive(Debug, Clone, Default, PartialEq)]
struct Entity {
    id: Option<i64>,
    created: DateTime<Utc>,
    revision: i32,
}

impl RowModel for Entity {
    fn declare(model: &mut ModelDecl<Self>) {
        model.default_constructor();
        model.column("id", |e| &e.id, |e, v| e.id = v).name(MAGIC_ID);
        model.column("created", |e| &e.created, |e, v| e.created = v);
        model.column("revision", |e| &e.revision, |e, v| e.revision = v);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Article {
    entity: Entity,
    slug: String,
    title: String,
    summary: Option<String>,
    words: i64,
    score: f64,
    pinned: bool,
    grade: char,
    published_on: Option<NaiveDate>,
    tags: Vec<String>,
    status: Status,
    views: Option<i32>,
}

impl RowModel for Article {
    fn declare(model: &mut ModelDecl<Self>) {
        model.table("articles").default_constructor();
        model.inherit::<Entity>(|a| &a.entity, |a| &mut a.entity);
        model.ignore("revision");
        model.column("slug", |a| &a.slug, |a, v| a.slug = v).key();
        model.column("title", |a| &a.title, |a, v| a.title = v).index(0);
        model.column("summary", |a| &a.summary, |a, v| a.summary = v);
        model.column("words", |a| &a.words, |a, v| a.words = v);
        model.column("score", |a| &a.score, |a, v| a.score = v);
        model.column("pinned", |a| &a.pinned, |a, v| a.pinned = v);
        model.column("grade", |a| &a.grade, |a, v| a.grade = v);
        model
            .column("published_on", |a| &a.published_on, |a, v| a.published_on = v)
            .since(2);
        model.column("tags", |a| &a.tags, |a, v| a.tags = v).since(2);
        model
            .column("status", |a| &a.status, |a, v| a.status = v)
            .lens(status_lens())
            .since(3);
        model.column("views", |a| &a.views, |a, v| a.views = v).since(3);
    }
}

/// A model with only the surrogate key to address rows by.
#[derive(Debug, Clone, Default, PartialEq)]
struct Comment {
    id: Option<i64>,
    body: String,
}

impl RowModel for Comment {
    fn declare(model: &mut ModelDecl<Self>) {
        model.table("comments").default_constructor().since(2);
        model.column("id", |c| &c.id, |c, v| c.id = v).name(MAGIC_ID);
        model.column("body", |c| &c.body, |c, v| c.body = v);
    }
}

/// Not part of any schema.
#[derive(Debug, Default)]
struct Orphan {
    name: String,
}

impl RowModel for Orphan {
    fn declare(model: &mut ModelDecl<Self>) {
        model.default_constructor();
        model.column("name", |o| &o.name, |o, v| o.name = v);
    }
}

/// `(id: int, key)`, `(name: text, nullable, default "x")`, `(extra: int, since 2)`.
#[derive(Debug, Default)]
struct T {
    id: i32,
    name: Option<String>,
    extra: i32,
}

impl RowModel for T {
    fn declare(model: &mut ModelDecl<Self>) {
        model.table("t").default_constructor();
        model.column("id", |t| &t.id, |t, v| t.id = v).key();
        model.column("name", |t| &t.name, |t, v| t.name = v).default("x");
        model.column("extra", |t| &t.extra, |t, v| t.extra = v).since(2);
    }
}

/// A boxed field forced to `NOT NULL` and added in version 2.
#[derive(Debug, Default)]
struct Player {
    id: i32,
    score: Option<i32>,
}

impl RowModel for Player {
    fn declare(model: &mut ModelDecl<Self>) {
        model.table("p").default_constructor();
        model.column("id", |p| &p.id, |p, v| p.id = v).key();
        model
            .column("score", |p| &p.score, |p, v| p.score = v)
            .nullable(false)
            .since(2);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn blog_schema(reflector: &Arc<Reflector>) -> Schema {
    Schema::builder("blog.db", 3)
        .reflector(Arc::clone(reflector))
        .table::<Article>()
        .unwrap()
        .table::<Comment>()
        .unwrap()
        .build()
        .unwrap()
}

fn blog() -> Database {
    let reflector = Arc::new(Reflector::default());
    let mut db = Database::new(blog_schema(&reflector), reflector);
    db.open_in_memory().unwrap();
    db
}

fn article(slug: &str) -> Article {
    Article {
        entity: Entity {
            id: None,
            created: Utc.timestamp_millis_opt(1_710_000_000_250).unwrap(),
            revision: 0,
        },
        slug: slug.into(),
        title: format!("On {slug}"),
        summary: Some("it's short".into()),
        words: 1_200,
        score: 0.75,
        pinned: true,
        grade: 'A',
        published_on: NaiveDate::from_ymd_opt(2024, 3, 9),
        tags: vec!["rust".into(), "sql".into()],
        status: Status::Published,
        views: None,
    }
}

/// `(name, type, notnull, default, pk)` of every column of `table`.
fn table_info(conn: &Connection, table: &str) -> BTreeSet<(String, String, bool, Option<String>, bool)> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})")).unwrap();
    stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>("name")?,
            row.get::<_, String>("type")?,
            row.get::<_, bool>("notnull")?,
            row.get::<_, Option<String>>("dflt_value")?,
            row.get::<_, bool>("pk")?,
        ))
    })
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap()
}

fn create_at(conn: &Connection, schema: &Schema, version: u32) {
    for step in plan_create_at(schema, version) {
        conn.execute_batch(step.sql()).unwrap();
    }
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))
        .unwrap();
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

#[test]
fn test_exact_ddl_from_row_model() {
    let schema = Schema::builder("t.db", 2)
        .table::<T>()
        .unwrap()
        .build()
        .unwrap();

    let create: Vec<String> = plan_create_at(&schema, 1)
        .iter()
        .map(|s| s.sql().to_string())
        .collect();
    assert_eq!(
        create,
        vec![
            "CREATE TABLE IF NOT EXISTS t ( _id INTEGER PRIMARY KEY AUTOINCREMENT, \
             id INTEGER UNIQUE NOT NULL, name TEXT NULL DEFAULT 'x' )"
        ]
    );

    let upgrade = plan_upgrade(&schema, 1, 2).unwrap();
    assert_eq!(upgrade.len(), 1);
    assert_eq!(
        upgrade[0].sql(),
        "ALTER TABLE t ADD COLUMN extra INTEGER NOT NULL DEFAULT 0"
    );
}

#[test]
fn test_nullable_numeric_defaults() {
    let schema = blog_schema(&Arc::new(Reflector::default()));
    let create = plan_create_at(&schema, 3);
    let articles = create[0].sql();

    assert!(articles.contains("views INTEGER NULL DEFAULT NULL"));
    assert!(articles.contains("words INTEGER NOT NULL DEFAULT 0"));
    assert!(articles.contains("score REAL NOT NULL DEFAULT 0.0"));
    assert!(articles.contains("status TEXT NOT NULL DEFAULT 'draft'"));
    assert!(articles.contains("slug TEXT UNIQUE NOT NULL,"));
    assert!(!articles.contains("revision"));
    // Explicitly indexed columns come right after the surrogate key.
    assert!(articles.starts_with(
        "CREATE TABLE IF NOT EXISTS articles ( _id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT"
    ));
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

#[test]
fn test_stepwise_direct_and_fresh_migrations_agree() {
    let schema = blog_schema(&Arc::new(Reflector::default()));

    let stepwise = Connection::open_in_memory().unwrap();
    create_at(&stepwise, &schema, 1);
    let mut migration = Migration::new(stepwise, schema.clone()).unwrap();
    migration.on_upgrade(1, 2).unwrap();
    migration.on_upgrade(2, 3).unwrap();
    let stepwise = migration.into_connection();

    let direct = Connection::open_in_memory().unwrap();
    create_at(&direct, &schema, 1);
    let mut migration = Migration::new(direct, schema.clone()).unwrap();
    assert_eq!(
        migration.migrate().unwrap(),
        MigrationOutcome::Upgraded { from: 1, to: 3 }
    );
    let direct = migration.into_connection();

    let mut migration = Migration::new(Connection::open_in_memory().unwrap(), schema).unwrap();
    assert_eq!(
        migration.migrate().unwrap(),
        MigrationOutcome::Created { version: 3 }
    );
    let fresh = migration.into_connection();

    for table in ["articles", "comments"] {
        let expected = table_info(&fresh, table);
        assert!(!expected.is_empty(), "{table} missing");
        assert_eq!(table_info(&stepwise, table), expected, "{table} stepwise");
        assert_eq!(table_info(&direct, table), expected, "{table} direct");
    }
}

#[test]
fn test_upgrade_keeps_existing_rows() {
    let schema = blog_schema(&Arc::new(Reflector::default()));
    let conn = Connection::open_in_memory().unwrap();
    create_at(&conn, &schema, 1);
    conn.execute(
        "INSERT INTO articles (title, created, grade, pinned, score, slug, words) \
         VALUES ('Old', 0, 65, 0, 0.0, 'old', 10)",
        [],
    )
    .unwrap();

    let reflector = Arc::new(Reflector::default());
    let mut db = Database::new(blog_schema(&reflector), reflector);
    assert_eq!(
        db.bind(conn).unwrap(),
        MigrationOutcome::Upgraded { from: 1, to: 3 }
    );

    let old: Article = db.select_by_key(&"old".to_string()).unwrap().unwrap();
    assert_eq!(old.title, "Old");
    assert_eq!(old.grade, 'A');
    assert!(old.tags.is_empty());
    assert_eq!(old.status, Status::Draft);
    assert_eq!(old.views, None);
    assert_eq!(old.published_on, None);
}

#[test]
fn test_not_null_boxed_column_added_to_populated_table() {
    let schema = Schema::builder("players.db", 2)
        .table::<Player>()
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        plan_upgrade(&schema, 1, 2).unwrap()[0].sql(),
        "ALTER TABLE p ADD COLUMN score INTEGER NOT NULL DEFAULT 0"
    );

    let conn = Connection::open_in_memory().unwrap();
    create_at(&conn, &schema, 1);
    conn.execute("INSERT INTO p (id) VALUES (7)", []).unwrap();

    let mut migration = Migration::new(conn, schema).unwrap();
    assert_eq!(
        migration.migrate().unwrap(),
        MigrationOutcome::Upgraded { from: 1, to: 2 }
    );
    let score: Option<i32> = migration
        .connection()
        .query_row("SELECT score FROM p WHERE id = 7", [], |row| row.get(0))
        .unwrap();
    assert_eq!(score, Some(0));
}

#[test]
fn test_reopen_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blog.db");
    let reflector = Arc::new(Reflector::default());

    let mut db = Database::new(blog_schema(&reflector), Arc::clone(&reflector));
    assert_eq!(
        db.open(&path).unwrap(),
        MigrationOutcome::Created { version: 3 }
    );
    db.insert(&mut article("persisted")).unwrap();
    drop(db.close());

    let mut db = Database::new(blog_schema(&reflector), reflector);
    assert_eq!(
        db.open(&path).unwrap(),
        MigrationOutcome::UpToDate { version: 3 }
    );
    assert_eq!(db.select_all::<Article>().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

#[test]
fn test_round_trip_through_store() {
    let db = blog();
    let mut original = article("round-trip");
    let id = db.insert(&mut original).unwrap();
    assert_eq!(original.entity.id, Some(id));

    let by_id: Article = db.select_by_id(id).unwrap().unwrap();
    // `revision` is ignored by the table and reads back as its default.
    assert_eq!(by_id, original);

    let by_key: Article = db
        .select_by_key(&"round-trip".to_string())
        .unwrap()
        .unwrap();
    assert_eq!(by_key, original);
}

#[test]
fn test_update_and_delete_by_natural_key() {
    let db = blog();
    let mut first = article("first");
    db.insert(&mut first).unwrap();
    db.insert(&mut article("second")).unwrap();

    first.title = "Renamed".into();
    first.views = Some(3);
    assert_eq!(db.update(&first).unwrap(), 1);
    let loaded: Article = db.select_by_key(&"first".to_string()).unwrap().unwrap();
    assert_eq!(loaded.title, "Renamed");
    assert_eq!(loaded.views, Some(3));

    assert_eq!(db.delete(&first).unwrap(), 1);
    assert_eq!(db.delete(&first).unwrap(), 0);
    let remaining = db.select_all::<Article>().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].slug, "second");
}

#[test]
fn test_surrogate_key_addressing() {
    let db = blog();
    let mut comment = Comment {
        id: None,
        body: "first!".into(),
    };
    let id = db.insert(&mut comment).unwrap();
    assert_eq!(comment.id, Some(id));

    comment.body = "edited".into();
    assert_eq!(db.update(&comment).unwrap(), 1);
    let loaded: Comment = db.select_by_key(&Some(id)).unwrap().unwrap();
    assert_eq!(loaded.body, "edited");

    assert_eq!(db.delete(&comment).unwrap(), 1);
    assert!(db.select_by_id::<Comment>(id).unwrap().is_none());
}

#[test]
fn test_process_result_set_matches_columns_by_name() {
    let db = blog();
    db.insert(&mut article("a")).unwrap();
    db.insert(&mut article("b")).unwrap();

    let conn = db.connection().unwrap();
    let mut stmt = conn
        .prepare("SELECT slug, title AS title, words FROM articles ORDER BY slug DESC")
        .unwrap();
    let mut rows = stmt.query([]).unwrap();
    let partial: Vec<Article> = db.process_result_set(&mut rows).unwrap();

    assert_eq!(partial.len(), 2);
    assert_eq!(partial[0].slug, "b");
    assert_eq!(partial[0].words, 1_200);
    assert_eq!(partial[0].entity.id, None);
    assert!(partial[0].tags.is_empty());
}

#[test]
fn test_store_errors_are_wrapped() {
    let db = blog();
    db.insert(&mut article("taken")).unwrap();
    let err = db.insert(&mut article("taken")).unwrap_err();
    assert!(matches!(err, SqliteError::Execution { .. }));
    assert!(err.to_string().contains("INSERT INTO articles"));

    let err = db
        .insert(&mut Orphan {
            name: "lost".into(),
        })
        .unwrap_err();
    match err {
        SqliteError::Execution { model, .. } => assert!(model.ends_with("Orphan")),
        other => panic!("expected an execution error, got {other}"),
    }
}

#[test]
fn test_field_override_changes_storage() {
    let mut registry = LensRegistry::default();
    registry.register_override::<Article>("tags", Lens::UNIT_SEPARATED_LIST);
    let reflector = Arc::new(Reflector::new(registry));
    let mut db = Database::new(blog_schema(&reflector), reflector);
    db.open_in_memory().unwrap();

    let mut tagged = article("tagged");
    tagged.tags = vec!["a,b".into(), "c".into()];
    db.insert(&mut tagged).unwrap();

    let stored: String = db
        .connection()
        .unwrap()
        .query_row("SELECT tags FROM articles", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, "a,b\u{1f}c");

    let loaded: Article = db.select_by_key(&"tagged".to_string()).unwrap().unwrap();
    assert_eq!(loaded.tags, tagged.tags);
}

#[test]
fn test_keyless_model_cannot_be_updated() {
    let reflector = Arc::new(Reflector::default());
    let schema = Schema::builder("orphans.db", 1)
        .reflector(Arc::clone(&reflector))
        .table::<Orphan>()
        .unwrap()
        .build()
        .unwrap();
    let mut db = Database::new(schema, reflector);
    db.open_in_memory().unwrap();

    let mut orphan = Orphan {
        name: "x".into(),
    };
    db.insert(&mut orphan).unwrap();
    let err = db.update(&orphan).unwrap_err();
    match err {
        SqliteError::Core(core) => assert!(core.is_schema_definition()),
        other => panic!("expected a schema definition error, got {other}"),
    }
}
