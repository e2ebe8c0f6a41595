mod config;

use std::fs;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use sqlshift_core::{Migrator, RollbackOutcome, ScriptStore};
use sqlshift_sqlite::SqliteTarget;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "sqlshift")]
#[command(about = "Apply, roll back, and create timestamped SQL migrations", version)]
struct Cli {
    /// YAML config file (default: ./sqlshift.yml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Migration script directory, overriding the config file.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    /// SQLite database file, overriding the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending migrations, or run `down`, `status`, or `help`.
    Migrate(MigrateArgs),
    /// Create empty up/down SQL migration files.
    CreateMigration(CreateMigrationArgs),
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// `down` to roll back the last migration, `status` to list applied and
    /// pending migrations, `help` for usage. Omit to apply.
    action: Option<String>,
}

#[derive(Debug, Args)]
struct CreateMigrationArgs {
    /// Human label, e.g. "create users".
    label: Option<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Migrate(args) => load_config(cli.config, cli.dir, cli.db)
            .and_then(|config| run_migrate(&config, args)),
        Command::CreateMigration(args) => load_config(cli.config, cli.dir, cli.db)
            .and_then(|config| run_create_migration(&config, args)),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn load_config(
    path: Option<PathBuf>,
    dir: Option<PathBuf>,
    db: Option<PathBuf>,
) -> Result<Config, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Failed to determine working directory: {e}"))?;
    let config = Config::resolve(path.as_deref(), &cwd)
        .map_err(|e| e.to_string())?
        .with_overrides(dir, db);
    debug!(
        migrations_dir = %config.migrations_dir.display(),
        database = %config.database.display(),
        ledger_table = %config.ledger_table,
        transactional = config.transactional,
        "Resolved configuration"
    );
    Ok(config)
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

fn run_migrate(config: &Config, args: MigrateArgs) -> Result<(), String> {
    match args.action.as_deref() {
        None => run_migrate_up(config),
        Some("down") => run_migrate_down(config),
        Some("status") => run_migrate_status(config),
        Some("help") => {
            print_migrate_help();
            Ok(())
        }
        Some(other) => {
            print_migrate_help();
            Err(format!("unknown argument: {other}"))
        }
    }
}

fn print_migrate_help() {
    println!("Usage:");
    println!("  sqlshift migrate          # Apply all pending migrations");
    println!("  sqlshift migrate down     # Roll back the last migration");
    println!("  sqlshift migrate status   # List applied and pending migrations");
    println!("  sqlshift migrate help     # Show this help message");
}

fn open_migrator(config: &Config) -> Result<Migrator<SqliteTarget>, String> {
    if let Some(parent) = config.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            format!("Failed to create database directory '{}': {e}", parent.display())
        })?;
    }
    let target = SqliteTarget::open(&config.database, &config.ledger_table)
        .map_err(|e| format!("Failed to open database '{}': {e}", config.database.display()))?
        .with_transactional(config.transactional);
    Ok(Migrator::new(ScriptStore::new(&config.migrations_dir), target))
}

fn run_migrate_up(config: &Config) -> Result<(), String> {
    let mut migrator = open_migrator(config)?;
    println!("Running migrations...");
    let report = migrator
        .apply()
        .map_err(|e| format!("Migration failed: {e}"))?;
    if report.is_empty() {
        println!("Nothing to apply.");
        return Ok(());
    }
    for name in &report.applied {
        println!("  applied {name}");
    }
    println!("Migrations complete ({} applied).", report.applied.len());
    Ok(())
}

fn run_migrate_down(config: &Config) -> Result<(), String> {
    let mut migrator = open_migrator(config)?;
    println!("Rolling back last migration...");
    match migrator
        .rollback()
        .map_err(|e| format!("Rollback failed: {e}"))?
    {
        RollbackOutcome::NothingToRollBack => println!("Nothing to roll back."),
        RollbackOutcome::RolledBack(entry) => println!("Rollback complete for {}.", entry.name),
    }
    Ok(())
}

fn run_migrate_status(config: &Config) -> Result<(), String> {
    let mut migrator = open_migrator(config)?;
    let status = migrator
        .status()
        .map_err(|e| format!("Failed to get migration status: {e}"))?;
    println!("Migration Status:");
    println!("  Applied: {}", status.applied.len());
    for name in &status.applied {
        println!("    {name}");
    }
    println!("  Pending: {}", status.pending.len());
    for name in &status.pending {
        println!("    {name}");
    }
    if !status.orphaned.is_empty() {
        println!("  Applied but missing from {}:", config.migrations_dir.display());
        for name in &status.orphaned {
            println!("    {name}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// create-migration
// ---------------------------------------------------------------------------

fn run_create_migration(config: &Config, args: CreateMigrationArgs) -> Result<(), String> {
    let label = args.label.unwrap_or_default();
    if label.is_empty() {
        return Err("Migration creation failed: missing migration name".to_string());
    }
    let created = ScriptStore::new(&config.migrations_dir)
        .create(&label)
        .map_err(|e| format!("Migration creation failed: {e}"))?;
    println!("Migration created:");
    println!("  {}", created.up.display());
    println!("  {}", created.down.display());
    Ok(())
}
