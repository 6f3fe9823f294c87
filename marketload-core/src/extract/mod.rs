//! Extractor: fetch the lookback window for every requested instrument and
//! write one staging artifact.

pub mod provider;
pub mod staging;
pub mod yahoo;

pub use provider::{DataProvider, ExtractionError, FetchResult, RawBar};
pub use staging::STAGING_FILE_NAME;
pub use yahoo::YahooProvider;

use chrono::{Duration, NaiveDate};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

/// What to extract: instruments and the lookback window ending on `as_of`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub symbols: Vec<String>,
    pub lookback_days: u32,
    pub as_of: NaiveDate,
}

impl ExtractRequest {
    pub fn new(symbols: Vec<String>, lookback_days: u32, as_of: NaiveDate) -> Self {
        Self {
            symbols,
            lookback_days,
            as_of,
        }
    }

    /// Inclusive `(start, end)` of the window.
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        let start = self.as_of - Duration::days(i64::from(self.lookback_days));
        (start, self.as_of)
    }

    fn validate(&self) -> Result<(), ExtractionError> {
        if self.symbols.is_empty() {
            return Err(ExtractionError::InvalidRequest(
                "at least one symbol is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for sym in &self.symbols {
            if sym.trim().is_empty() {
                return Err(ExtractionError::InvalidRequest("blank symbol".into()));
            }
            if !seen.insert(sym.as_str()) {
                return Err(ExtractionError::InvalidRequest(format!(
                    "duplicate symbol '{sym}'"
                )));
            }
        }
        if self.lookback_days == 0 {
            return Err(ExtractionError::InvalidRequest(
                "lookback window must be at least one day".into(),
            ));
        }
        Ok(())
    }
}

/// Location and shape summary of a written staging artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArtifact {
    pub path: PathBuf,
    pub symbols: Vec<String>,
    /// Number of date rows in the artifact.
    pub rows: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Fetches raw observations and writes the staging artifact.
pub struct Extractor<'a> {
    provider: &'a dyn DataProvider,
    staging_dir: PathBuf,
}

impl<'a> Extractor<'a> {
    pub fn new(provider: &'a dyn DataProvider, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Fetch every requested symbol and write the staging artifact.
    ///
    /// Fails on the first symbol that errors or returns no rows. Nothing is
    /// written unless every symbol produced data.
    pub fn extract(&self, request: &ExtractRequest) -> Result<StagingArtifact, ExtractionError> {
        request.validate()?;
        let (start, end) = request.window();
        let _span = info_span!("extract", provider = self.provider.name()).entered();

        let mut fetched = Vec::with_capacity(request.symbols.len());
        for symbol in &request.symbols {
            let result = self.provider.fetch(symbol, start, end)?;
            if result.bars.is_empty() {
                return Err(ExtractionError::NoRows {
                    symbol: symbol.clone(),
                    start,
                    end,
                });
            }
            if result.symbol != *symbol {
                return Err(ExtractionError::ResponseFormatChanged(format!(
                    "requested '{symbol}' but provider answered for '{}'",
                    result.symbol
                )));
            }
            info!(%symbol, bars = result.bars.len(), "fetched");
            fetched.push(result);
        }

        let path = self.staging_dir.join(STAGING_FILE_NAME);
        let rows = staging::write_staging(&path, &fetched)?;
        info!(path = %path.display(), rows, "wrote staging artifact");

        Ok(StagingArtifact {
            path,
            symbols: request.symbols.clone(),
            rows,
            start,
            end,
        })
    }
}
