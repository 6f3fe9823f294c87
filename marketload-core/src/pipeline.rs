//! One pipeline run: extract → normalize → load, strictly in sequence.

use crate::config::{ConfigError, PipelineConfig};
use crate::extract::{DataProvider, ExtractRequest, ExtractionError, Extractor};
use crate::load::{LoadCoordinator, LoadError, LoadSummary, Warehouse};
use crate::normalize::{NormalizationError, NormalizeOptions, SchemaNormalizer};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, info_span};

/// Failure of a run, tagged by the stage that raised it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl PipelineError {
    /// Name of the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Extraction(_) => "extract",
            PipelineError::Normalization(_) => "normalize",
            PipelineError::Load(_) => "load",
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub as_of: NaiveDate,
    pub staging_path: PathBuf,
    pub canonical_path: PathBuf,
    pub tickers: Vec<String>,
    pub load: LoadSummary,
}

impl RunReport {
    pub fn rows_loaded(&self) -> usize {
        self.load.rows_inserted
    }
}

/// Run all three stages for `config` against an injected provider and
/// warehouse. The first failing stage's error is returned as-is.
///
/// Runs against the same target table must not overlap.
pub fn run_pipeline<W: Warehouse + ?Sized>(
    config: &PipelineConfig,
    provider: &dyn DataProvider,
    warehouse: &mut W,
    as_of: NaiveDate,
) -> Result<RunReport, PipelineError> {
    config.validate()?;
    let table = config.table()?;
    let _span = info_span!("run", %as_of, table = %table).entered();

    let request = ExtractRequest::new(config.symbols.clone(), config.lookback_days, as_of);
    let staging = Extractor::new(provider, &config.staging_dir).extract(&request)?;

    let options = NormalizeOptions {
        flat_ticker: config.resolved_flat_ticker().map(String::from),
    };
    let canonical =
        SchemaNormalizer::new(options).normalize_file(&staging.path, &config.staging_dir)?;

    let load = LoadCoordinator::new(table)
        .with_batch_size(config.batch_size)
        .load_artifact(warehouse, &canonical.path)?;

    info!(rows = load.rows_inserted, "run complete");
    Ok(RunReport {
        as_of,
        staging_path: staging.path,
        canonical_path: canonical.path,
        tickers: canonical.manifest.tickers,
        load,
    })
}
