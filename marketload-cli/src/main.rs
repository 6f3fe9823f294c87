//! marketload CLI: stage commands for an external scheduler, plus a full run.
//!
//! Commands:
//! - `extract`: fetch the lookback window from Yahoo Finance, write the staging CSV
//! - `normalize`: turn a staging CSV into the canonical CSV
//! - `load`: full-refresh the target table from a canonical CSV
//! - `run`: all three stages in sequence
//! - `config`: print the effective configuration as TOML
//!
//! Stage commands print what they produced on stdout so a scheduler can chain
//! them. Logs go to stderr. Runs against the same table must not overlap.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use marketload_core::extract::{YahooProvider, STAGING_FILE_NAME};
use marketload_core::load::{DuckDbWarehouse, MemoryWarehouse, Warehouse};
use marketload_core::normalize::UNKNOWN_TICKER;
use marketload_core::{
    run_pipeline, ExtractRequest, Extractor, LoadCoordinator, LoadSummary, NormalizeOptions,
    PipelineConfig, SchemaNormalizer,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "marketload",
    about = "Daily OHLCV extract, normalize and full-refresh load"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the lookback window and write the staging CSV.
    Extract {
        #[command(flatten)]
        overrides: Overrides,

        /// Last day of the window (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Normalize a staging CSV into the canonical CSV.
    Normalize {
        #[command(flatten)]
        overrides: Overrides,

        /// Staging CSV. Defaults to <staging-dir>/raw_stock_data.csv.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Replace the target table's contents with a canonical CSV.
    Load {
        #[command(flatten)]
        overrides: Overrides,

        /// Canonical CSV to load.
        #[arg(long, required = true)]
        input: PathBuf,

        /// Run the load against an in-memory warehouse instead of the database.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Run extract, normalize and load in sequence.
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Last day of the window (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Run the load against an in-memory warehouse instead of the database.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Flags that override config file values.
#[derive(Args)]
struct Overrides {
    /// Symbols to extract (e.g., AVGO NVDA).
    #[arg(long, num_args = 1..)]
    symbols: Option<Vec<String>>,

    /// Lookback window in calendar days.
    #[arg(long)]
    lookback_days: Option<u32>,

    /// Target table, optionally schema-qualified.
    #[arg(long)]
    table: Option<String>,

    /// DuckDB database file.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Directory for staging and canonical artifacts.
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Rows per INSERT statement.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Ticker for single-instrument (flat) staging files.
    #[arg(long)]
    flat_ticker: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(symbols) = self.symbols {
            config.symbols = symbols;
        }
        if let Some(days) = self.lookback_days {
            config.lookback_days = days;
        }
        if let Some(table) = self.table {
            config.target_table = table;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(dir) = self.staging_dir {
            config.staging_dir = dir;
        }
        if let Some(batch) = self.batch_size {
            config.batch_size = batch;
        }
        if self.flat_ticker.is_some() {
            config.flat_ticker = self.flat_ticker;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config;
    match cli.command {
        Commands::Extract { overrides, as_of } => {
            let config = effective_config(config_path.as_deref(), overrides)?;
            run_extract(&config, as_of.as_deref())
        }
        Commands::Normalize { overrides, input } => {
            let config = effective_config(config_path.as_deref(), overrides)?;
            run_normalize(&config, input)
        }
        Commands::Load {
            overrides,
            input,
            dry_run,
        } => {
            let config = effective_config(config_path.as_deref(), overrides)?;
            run_load(&config, &input, dry_run)
        }
        Commands::Run {
            overrides,
            as_of,
            dry_run,
        } => {
            let config = effective_config(config_path.as_deref(), overrides)?;
            run_all(&config, as_of.as_deref(), dry_run)
        }
        Commands::Config { overrides } => {
            let config = effective_config(config_path.as_deref(), overrides)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn effective_config(path: Option<&Path>, overrides: Overrides) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(p) => PipelineConfig::from_file(p)?,
        None => PipelineConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn parse_as_of(as_of: Option<&str>) -> Result<NaiveDate> {
    match as_of {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of date '{s}', expected YYYY-MM-DD")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn run_extract(config: &PipelineConfig, as_of: Option<&str>) -> Result<()> {
    let as_of = parse_as_of(as_of)?;
    let provider = YahooProvider::new()?;
    let request = ExtractRequest::new(config.symbols.clone(), config.lookback_days, as_of);
    let artifact = Extractor::new(&provider, &config.staging_dir).extract(&request)?;
    println!("{}", artifact.path.display());
    Ok(())
}

fn run_normalize(config: &PipelineConfig, input: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| config.staging_dir.join(STAGING_FILE_NAME));
    if !input.exists() {
        bail!("staging file not found: {}", input.display());
    }

    let flat_ticker = config.resolved_flat_ticker().map(String::from);
    if flat_ticker.is_none() {
        info!(
            placeholder = UNKNOWN_TICKER,
            "no flat ticker configured; a flat staging file would be labelled with the placeholder"
        );
    }
    let normalizer = SchemaNormalizer::new(NormalizeOptions { flat_ticker });
    let artifact = normalizer.normalize_file(&input, &config.staging_dir)?;
    println!("{}", artifact.path.display());
    Ok(())
}

fn run_load(config: &PipelineConfig, input: &Path, dry_run: bool) -> Result<()> {
    let coordinator = LoadCoordinator::new(config.table()?).with_batch_size(config.batch_size);
    let mut warehouse = open_warehouse(config, dry_run)?;
    let summary = coordinator.load_artifact(warehouse.as_mut(), input)?;
    print_summary(&summary, dry_run);
    Ok(())
}

fn run_all(config: &PipelineConfig, as_of: Option<&str>, dry_run: bool) -> Result<()> {
    let as_of = parse_as_of(as_of)?;
    let provider = YahooProvider::new()?;
    let mut warehouse = open_warehouse(config, dry_run)?;

    let report = match run_pipeline(config, &provider, warehouse.as_mut(), as_of) {
        Ok(report) => report,
        Err(e) => {
            let stage = e.stage();
            return Err(anyhow::Error::new(e).context(format!("{stage} stage failed")));
        }
    };
    println!("staging:   {}", report.staging_path.display());
    println!("canonical: {}", report.canonical_path.display());
    print_summary(&report.load, dry_run);
    Ok(())
}

fn open_warehouse(config: &PipelineConfig, dry_run: bool) -> Result<Box<dyn Warehouse>> {
    if dry_run {
        warn!("dry run: loading into an in-memory warehouse, the database is not touched");
        return Ok(Box::new(MemoryWarehouse::new()));
    }
    let warehouse = DuckDbWarehouse::open(&config.database)
        .with_context(|| format!("opening {}", config.database.display()))?;
    Ok(Box::new(warehouse))
}

fn print_summary(summary: &LoadSummary, dry_run: bool) {
    let prefix = if dry_run { "[dry run] " } else { "" };
    println!(
        "{prefix}{}: {} rows replaced by {} rows in {} batch(es)",
        summary.table, summary.rows_deleted, summary.rows_inserted, summary.batches
    );
}
