use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use lensorm_core::Schema;
use lensorm_db::{DatabaseError, Manifest, SchemaFile, fingerprint};
use lensorm_sqlite::{Migration, MigrationStatus, plan_create_at, plan_upgrade};
use serde::Serialize;

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliOutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "lensorm")]
#[command(version)]
#[command(about = "Schema files, DDL, and migrations for lensorm SQLite databases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the DDL that creates or upgrades a schema.
    Ddl(DdlArgs),
    /// Create or upgrade a database file to the schema's version.
    Migrate(MigrateArgs),
    /// Show installed and target versions and per-table state.
    Status(StatusArgs),
    /// Print a schema's fingerprint, optionally checking or recording it.
    Fingerprint(FingerprintArgs),
}

#[derive(Debug, Args)]
struct DdlArgs {
    /// Schema file (.json, .yaml, or .yml).
    schema: PathBuf,
    /// Print the upgrade from this installed version instead of a fresh create.
    #[arg(long)]
    from: Option<u32>,
    /// Target version (default: the schema's version).
    #[arg(long)]
    to: Option<u32>,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Schema file (.json, .yaml, or .yml).
    schema: PathBuf,
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Fingerprint manifest to check before migrating and update afterwards.
    #[arg(long)]
    manifest: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Schema file (.json, .yaml, or .yml).
    schema: PathBuf,
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Output format.
    #[arg(long, default_value = "text")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct FingerprintArgs {
    /// Schema file (.json, .yaml, or .yml).
    schema: PathBuf,
    /// Fingerprint manifest to check against.
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Record the fingerprint in the manifest instead of checking it.
    #[arg(long, requires = "manifest")]
    record: bool,
    /// Output format.
    #[arg(long, default_value = "text")]
    format: CliOutputFormat,
}

/// Machine-readable result of the `fingerprint` command.
#[derive(Debug, Serialize)]
struct FingerprintReport {
    schema: String,
    version: u32,
    fingerprint: String,
    recorded: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ddl(args) => run_ddl(args),
        Command::Migrate(args) => run_migrate(args),
        Command::Status(args) => run_status(args),
        Command::Fingerprint(args) => run_fingerprint(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_ddl(args: DdlArgs) -> Result<(), String> {
    let schema = load_schema(&args.schema)?;
    let to = args.to.unwrap_or(schema.version);
    if to == 0 || to > schema.version {
        return Err(format!(
            "target version {to} is outside 1..={} for `{}`",
            schema.version, schema.name
        ));
    }

    let steps = match args.from {
        Some(from) => plan_upgrade(&schema, from, to).map_err(|e| e.to_string())?,
        None => plan_create_at(&schema, to),
    };
    if steps.is_empty() {
        eprintln!("No statements for `{}` at version {to}.", schema.name);
    }
    for step in &steps {
        println!("{};", step.sql());
    }
    Ok(())
}

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    let schema = load_schema(&args.schema)?;

    let mut manifest = match &args.manifest {
        Some(path) => {
            let manifest = Manifest::load_or_new(path, &schema.name)
                .map_err(|e| format!("Failed to load manifest '{}': {e}", path.display()))?;
            manifest.check(&schema).map_err(|e| e.to_string())?;
            Some(manifest)
        }
        None => None,
    };

    let mut migration = open_migration(&args.db, schema)?;
    let outcome = migration
        .migrate()
        .map_err(|e| format!("Migration failed: {e}"))?;
    println!("{}: {outcome}.", args.db.display());

    if let (Some(manifest), Some(path)) = (manifest.as_mut(), &args.manifest) {
        if manifest.record(migration.schema()) {
            manifest
                .save(path)
                .map_err(|e| format!("Failed to save manifest '{}': {e}", path.display()))?;
            println!(
                "Recorded fingerprint for version {} in '{}'.",
                migration.schema().version,
                path.display()
            );
        }
    }
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<(), String> {
    let schema = load_schema(&args.schema)?;
    let migration = open_migration(&args.db, schema)?;
    let status = migration
        .status()
        .map_err(|e| format!("Failed to get migration status: {e}"))?;

    match args.format {
        CliOutputFormat::Json => println!("{}", to_json(&status)?),
        CliOutputFormat::Text => print_status(&status),
    }
    Ok(())
}

fn run_fingerprint(args: FingerprintArgs) -> Result<(), String> {
    let schema = load_schema(&args.schema)?;
    let current = fingerprint(&schema);

    let mut recorded = None;
    if let Some(path) = &args.manifest {
        let mut manifest = Manifest::load_or_new(path, &schema.name)
            .map_err(|e| format!("Failed to load manifest '{}': {e}", path.display()))?;
        if args.record {
            // Re-recording a changed version is allowed; a foreign manifest is not.
            match manifest.check(&schema) {
                Ok(()) | Err(DatabaseError::FingerprintMismatch { .. }) => {}
                Err(e) => return Err(e.to_string()),
            }
            if manifest.record(&schema) {
                manifest
                    .save(path)
                    .map_err(|e| format!("Failed to save manifest '{}': {e}", path.display()))?;
            }
        } else {
            manifest.check(&schema).map_err(|e| e.to_string())?;
        }
        recorded = manifest.get(schema.version).map(str::to_string);
    }

    match args.format {
        CliOutputFormat::Json => {
            let report = FingerprintReport {
                schema: schema.name.clone(),
                version: schema.version,
                fingerprint: current,
                recorded,
            };
            println!("{}", to_json(&report)?);
        }
        CliOutputFormat::Text => {
            println!("{current}");
            if recorded.is_none() && args.manifest.is_some() {
                eprintln!(
                    "Version {} of `{}` is not recorded in the manifest.",
                    schema.version, schema.name
                );
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_schema(path: &Path) -> Result<Schema, String> {
    SchemaFile::load(path)
        .map(SchemaFile::into_schema)
        .map_err(|e| format!("Failed to load schema '{}': {e}", path.display()))
}

fn open_migration(db: &Path, schema: Schema) -> Result<Migration, String> {
    let conn = rusqlite::Connection::open(db)
        .map_err(|e| format!("Failed to open database '{}': {e}", db.display()))?;
    Migration::new(conn, schema).map_err(|e| format!("Failed to initialize migration: {e}"))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn print_status(status: &MigrationStatus) {
    println!("Migration Status for `{}`:", status.schema);
    println!("  Installed version: {}", status.installed_version);
    println!("  Target version: {}", status.target_version);
    println!(
        "  Pending: {}",
        if status.is_pending() { "yes" } else { "no" }
    );
    for table in &status.tables {
        match table.row_count {
            Some(rows) => println!("  {} (since {}): {rows} rows", table.name, table.since),
            None => println!("  {} (since {}): missing", table.name, table.since),
        }
    }
}
