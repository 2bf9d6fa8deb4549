//! meshdb-migrate CLI - MeshMonitor SQLite to PostgreSQL/MySQL migration.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use meshdb_migrate::error::EXIT_CONFIG_ERROR;
use meshdb_migrate::{
    MigrateError, MigrationOptions, MigrationSpec, MigrationSummary, Orchestrator, SchemaSource,
    TableStatus, DEFAULT_BATCH_SIZE,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "meshdb-migrate")]
#[command(about = "Migrate a MeshMonitor SQLite database to PostgreSQL or MySQL")]
#[command(version)]
struct Cli {
    /// Source SQLite database (sqlite://path, file:path or a plain path)
    #[arg(long, env = "MESHDB_SOURCE")]
    source: String,

    /// Target database URL (postgres://... or mysql://...)
    #[arg(long, env = "MESHDB_TARGET")]
    target: String,

    /// Count and transform rows without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Rows read from the source per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// YAML migration spec to use instead of the builtin MeshMonitor spec
    #[arg(long)]
    spec: Option<PathBuf>,

    /// DDL script applied strictly before loading data
    #[arg(long, conflicts_with = "no_schema")]
    schema: Option<PathBuf>,

    /// Canonical table list shipped with --schema
    #[arg(long, requires = "schema", value_delimiter = ',')]
    schema_tables: Vec<String>,

    /// Do not create target tables; they must already exist
    #[arg(long)]
    no_schema: bool,

    /// Output JSON summary to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return usage_exit(e),
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Help and version exit 0; usage errors exit with the configuration-error
/// status.
fn usage_exit(e: clap::Error) -> ExitCode {
    let _ = e.print();
    if e.use_stderr() {
        ExitCode::from(EXIT_CONFIG_ERROR)
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(cli: Cli) -> Result<(), MigrateError> {
    let verbosity = if cli.verbose { "debug" } else { cli.verbosity.as_str() };
    setup_logging(verbosity, &cli.log_format);

    let mut options = MigrationOptions::new(&cli.source, &cli.target)?;
    options.dry_run = cli.dry_run;
    options.verbose = cli.verbose;
    options.batch_size = cli.batch_size;
    options.schema = match (cli.schema, cli.no_schema) {
        (Some(path), _) => SchemaSource::Script {
            path,
            tables: cli.schema_tables,
        },
        (None, true) => SchemaSource::None,
        (None, false) => SchemaSource::Derived,
    };
    if let Some(path) = &cli.spec {
        options.spec = MigrationSpec::load(path)?;
        info!("Loaded migration spec from {:?}", path);
    }

    let mut orchestrator = Orchestrator::new(options)?;
    let summary = orchestrator.run().await?;

    if cli.output_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &MigrationSummary) {
    let status_msg = if summary.dry_run {
        "Dry run completed!"
    } else {
        "Migration completed!"
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", summary.run_id);
    println!("  Target: {}", summary.engine);

    for stats in &summary.tables {
        let detail = match &stats.status {
            TableStatus::Migrated => {
                let mut line = format!(
                    "{} migrated in {:.2}s",
                    stats.migrated_rows,
                    stats.elapsed.as_secs_f64()
                );
                if stats.conflicts > 0 {
                    line.push_str(&format!(", {} already present", stats.conflicts));
                }
                if stats.rejected > 0 {
                    line.push_str(&format!(", {} rejected", stats.rejected));
                }
                line
            }
            TableStatus::DryRun => "dry run".to_string(),
            TableStatus::Empty => "skipped (empty)".to_string(),
            TableStatus::Unreadable(reason) => format!("skipped ({})", reason),
        };
        println!("  {:<32} {:>8} rows  {}", stats.table, stats.source_rows, detail);
    }

    println!("  Duration: {:.2}s", summary.duration_seconds);
    println!(
        "  Rows: {} source, {} migrated",
        summary.total_source_rows, summary.total_migrated_rows
    );
    if !summary.resynced.is_empty() {
        println!("  Identity columns resynced: {}", summary.resynced.len());
    }
    for warning in &summary.warnings {
        println!("  Warning: {}", warning);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
