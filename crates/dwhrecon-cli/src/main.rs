use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dwhrecon_catalog::{
    CachedCatalog, CatalogAdapter, JsonLinesSource, MockCatalog, PostgresCatalog,
};
use dwhrecon_core::{
    ChunkingStrategy, Config, DwhRelation, Loading, LoadingMetric, LoadingStatusKind, Relation,
    RunReport,
};
use dwhrecon_engine::{
    plan_chunks, IncrementalPlanner, InMemoryRecorder, LoadingRunner, Materializer, RunRecorder,
};

const DEFAULT_CONFIG: &str = "dwhrecon.toml";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// dwhrecon - Row-level reconciliation for warehouse loadings
#[derive(Parser)]
#[command(name = "dwhrecon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: dwhrecon.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile rows already in the warehouse against freshly extracted ones
    Reconcile(ReconcileArgs),

    /// Show the watermark the next run of a loading extracts from
    Plan {
        /// Loading name from the config file
        loading: String,

        /// Metrics of prior runs (JSON array)
        #[arg(short, long)]
        metrics: PathBuf,
    },

    /// Split rows into chunks of a crushing column
    Chunks {
        /// JSON-lines rows to split
        rows: PathBuf,

        /// Relation definition JSON
        #[arg(short, long)]
        relation: PathBuf,

        /// Crushing column
        #[arg(short = 'k', long)]
        column: String,

        /// Distinct values per chunk
        #[arg(short = 'n', long, default_value_t = 1000)]
        size: usize,
    },

    /// Validate every loading in the config file
    CheckConfig,
}

#[derive(Args)]
struct ReconcileArgs {
    /// Loading name from the config file (default: snapshot of --relation)
    #[arg(short, long)]
    loading: Option<String>,

    /// Relation definition JSON (instead of the configured metadata provider)
    #[arg(short, long)]
    relation: Option<PathBuf>,

    /// JSON-lines rows already loaded into the warehouse
    #[arg(long)]
    old: PathBuf,

    /// JSON-lines rows extracted from the source
    #[arg(long)]
    new: PathBuf,

    /// Metrics of prior runs (JSON array), updated after a successful run
    #[arg(short, long)]
    metrics: Option<PathBuf>,

    /// Output file for report.json
    #[arg(short, long, default_value = "report.json")]
    output: PathBuf,

    /// Leave key lists out of the report
    #[arg(long)]
    summary_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Reconcile(args) => reconcile_command(&config, args, cli.verbose).await,
        Commands::Plan { loading, metrics } => plan_command(&config, &loading, &metrics),
        Commands::Chunks {
            rows,
            relation,
            column,
            size,
        } => chunks_command(&rows, &relation, &column, size),
        Commands::CheckConfig => check_config_command(&config),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    let config = if let Some(config_path) = path {
        Config::from_file(config_path)?
    } else if Path::new(DEFAULT_CONFIG).exists() {
        Config::from_file(Path::new(DEFAULT_CONFIG))?
    } else {
        if verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    tracing::debug!(
        loadings = config.loadings.len(),
        metadata_columns = config.metadata_columns.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Reconcile command - one run of one loading over JSON-lines files
async fn reconcile_command(config: &Config, args: ReconcileArgs, verbose: bool) -> Result<()> {
    let relation_file = args.relation.as_deref().map(read_relation).transpose()?;

    let loading = match (&args.loading, &relation_file) {
        (Some(name), _) => config.loading(name)?,
        (None, Some(relation)) => adhoc_loading(relation),
        (None, None) => {
            return Err(anyhow::anyhow!(
                "Nothing to reconcile: pass --loading <name> or --relation <file>"
            ))
        }
    };

    let catalog = build_catalog(config, relation_file).await?;

    if verbose {
        eprintln!(
            "{} {} ({}) via {}",
            "Reconciling".cyan(),
            loading.name(),
            loading.strategy().kind(),
            catalog.name()
        );
    }

    let relation = catalog
        .fetch_relation(loading.source())
        .await
        .with_context(|| format!("Failed to fetch relation {}", loading.source()))?;
    let mirror_relation = relation.mirrored_as(loading.destination().identifier()?);

    let source = JsonLinesSource::new("new")
        .with_file(&relation, &args.new)
        .with_context(|| format!("Failed to read {}", args.new.display()))?;
    let mirror = JsonLinesSource::new("old")
        .with_file(&mirror_relation, &args.old)
        .with_context(|| format!("Failed to read {}", args.old.display()))?;

    let prior = match &args.metrics {
        Some(path) if path.exists() => read_metrics(path)?,
        _ => Vec::new(),
    };
    let recorder = InMemoryRecorder::new().with_metrics(prior.clone());

    let runner = LoadingRunner::new(catalog.as_ref(), &source, &mirror, &recorder)
        .with_config(config.clone());
    let report = runner.run(&loading).await;

    if let (Some(path), false) = (&args.metrics, report.has_errors()) {
        let mut metrics: Vec<LoadingMetric> = prior
            .into_iter()
            .filter(|m| m.loading() != loading.name())
            .collect();
        metrics.extend(recorder.metrics(loading.name())?);
        std::fs::write(path, serde_json::to_string_pretty(&metrics)?)?;
        if verbose {
            eprintln!("{} {}", "Metrics saved to:".green(), path.display());
        }
    }

    let report = if args.summary_only { report.without_keys() } else { report };
    report.save_to_file(&args.output)?;

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), args.output.display());
    }

    print_report_summary(&report);

    // Exit with error code if the run failed
    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Plan command - next watermark of a loading
fn plan_command(config: &Config, loading_name: &str, metrics_path: &Path) -> Result<()> {
    let loading = config.loading(loading_name)?;
    let metrics = read_metrics(metrics_path)?;

    let Some(column) = loading.strategy().increment_column() else {
        println!(
            "{} is a {} loading; every run extracts everything",
            loading.name().bold(),
            loading.strategy().kind()
        );
        return Ok(());
    };

    match IncrementalPlanner::new(&loading).next_watermark(&metrics) {
        Some(watermark) => {
            let comparison = if loading.strategy().is_overlapping() {
                "(overlapping)"
            } else {
                ""
            };
            println!(
                "{} {} >= {} {}",
                "Next run extracts".cyan(),
                column,
                watermark.to_string().bold(),
                comparison
            );
        }
        None => println!(
            "{}",
            "No prior successful run; next run extracts everything".yellow()
        ),
    }

    Ok(())
}

/// Chunks command - chunk boundaries of a crushing column
fn chunks_command(rows_path: &Path, relation_path: &Path, column: &str, size: usize) -> Result<()> {
    let relation = read_relation(relation_path)?;
    relation.require_column(column)?;
    let chunking = ChunkingStrategy::new(relation.name(), column, size)?;

    let source = JsonLinesSource::new("rows")
        .with_file(&relation, rows_path)
        .with_context(|| format!("Failed to read {}", rows_path.display()))?;
    let materializer = Materializer::new(&source, &relation)?;
    let boundaries = plan_chunks(&materializer, chunking.crushing_column(), chunking.chunk_size())?;

    if boundaries.is_empty() {
        println!("{}", "No non-NULL values; nothing to chunk".yellow());
        return Ok(());
    }

    for (i, boundary) in boundaries.iter().enumerate() {
        println!("  {} {} {}", "chunk".cyan(), i + 1, boundary);
    }
    println!();
    println!(
        "{} chunks of up to {} distinct {} values",
        boundaries.len().to_string().bold(),
        chunking.chunk_size(),
        column
    );

    Ok(())
}

/// Check-config command - validate every loading definition
fn check_config_command(config: &Config) -> Result<()> {
    match config.loadings() {
        Ok(loadings) => {
            for loading in &loadings {
                let chunked = loading
                    .chunking()
                    .map(|c| format!(", chunked by {} x{}", c.crushing_column(), c.chunk_size()))
                    .unwrap_or_default();
                println!(
                    "  {} {} ({}{}) {} -> {}",
                    "✓".green(),
                    loading.name(),
                    loading.strategy().kind(),
                    chunked,
                    loading.source(),
                    loading.destination().fqn
                );
            }
            println!();
            println!("{} {} loadings valid", "✓".green(), loadings.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} [{}] {}", "✗".red(), e.code(), e);
            std::process::exit(1);
        }
    }
}

/// Metadata provider for a run: the relation file if given, otherwise the
/// configured catalog
async fn build_catalog(
    config: &Config,
    relation: Option<Relation>,
) -> Result<Box<dyn CatalogAdapter>> {
    let ttl = Duration::from_secs(
        config
            .catalog
            .as_ref()
            .and_then(|c| c.cache_ttl_secs)
            .unwrap_or(DEFAULT_CACHE_TTL_SECS),
    );

    if let Some(relation) = relation {
        let mock = MockCatalog::from_relations(vec![relation]).with_name("file");
        return Ok(Box::new(CachedCatalog::new(mock, ttl)));
    }

    let catalog_config = config.catalog.as_ref().ok_or_else(|| {
        anyhow::anyhow!(
            "No relation definition given and no [catalog] section in {}. \
             Pass --relation or configure a metadata provider.",
            DEFAULT_CONFIG
        )
    })?;

    match catalog_config.catalog_type.to_lowercase().as_str() {
        "postgres" | "postgresql" => {
            let catalog = PostgresCatalog::from_config(catalog_config)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to metadata provider: {}", e))?;
            catalog
                .test_connection()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to metadata provider: {}", e))?;
            Ok(Box::new(CachedCatalog::new(catalog, ttl)))
        }
        other => Err(anyhow::anyhow!(
            "Unsupported catalog type '{}'. Supported: postgres",
            other
        )),
    }
}

/// Snapshot loading of a relation into `dwh.<namespace>.<relation>`
fn adhoc_loading(relation: &Relation) -> Loading {
    let id = relation.identifier();
    Loading::snapshot(
        id.relation.clone(),
        id.clone(),
        DwhRelation::new(format!("dwh.{}.{}", id.namespace, id.relation)),
    )
}

fn read_relation(path: &Path) -> Result<Relation> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read relation file {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Invalid relation definition in {}", path.display()))
}

fn read_metrics(path: &Path) -> Result<Vec<LoadingMetric>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metrics file {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid metrics in {}", path.display()))
}

/// Print report summary to console
fn print_report_summary(report: &RunReport) {
    println!();
    let status = match report.status {
        LoadingStatusKind::Completed => report.status.to_string().green(),
        LoadingStatusKind::Failed => report.status.to_string().red(),
        _ => report.status.to_string().yellow(),
    };
    println!("{} {} [{}]", "Loading".bold(), report.loading, status);

    if let Some(watermark) = &report.watermark {
        println!("  {} {}", "Watermark:".cyan(), watermark);
    }
    if report.chunks > 0 {
        println!("  {} {}", "Chunks:".cyan(), report.chunks);
    }

    if let Some(error) = &report.error {
        println!("  {} [{}] {}", "✗".red(), error.code, error.message);
        return;
    }

    let summary = &report.summary;
    println!(
        "  {} added, {} removed, {} changed, {} unchanged ({} rows read)",
        summary.added.to_string().green(),
        summary.removed.to_string().red(),
        summary.changed.to_string().yellow(),
        summary.unchanged,
        report.records_count
    );
    if let Some(hash) = &report.rows_set_hash {
        println!("  {} {}", "Row set hash:".cyan(), hash);
    }
}
