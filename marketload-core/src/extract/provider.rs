//! Data provider trait and extraction error types.
//!
//! The DataProvider trait abstracts over the upstream market-data source so the
//! extractor can be driven by Yahoo Finance in production and by a scripted
//! provider in tests.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Raw daily OHLCV bar as returned by a provider.
///
/// Missing prices are carried as NaN and a missing volume as `None`; the
/// staging writer turns both into empty cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
    pub adj_close: f64,
}

/// Errors raised while fetching observations or writing the staging artifact.
///
/// No variant is retried locally; the scheduler decides whether to rerun.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid extract request: {0}")]
    InvalidRequest(String),

    #[error("provider unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("provider throttled the request; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider refused credentials: {0}")]
    AuthenticationRequired(String),

    #[error("HTTP {status} for {symbol}")]
    Http { symbol: String, status: u16 },

    #[error("unexpected provider payload: {0}")]
    ResponseFormatChanged(String),

    #[error("provider has no instrument '{symbol}'")]
    SymbolNotFound { symbol: String },

    #[error("no rows returned for '{symbol}' between {start} and {end}")]
    NoRows {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("write staging artifact {path}: {source}")]
    StagingWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("staging CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Result of a successful fetch for a single symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub symbol: String,
    pub bars: Vec<RawBar>,
}

/// Trait for upstream market-data sources.
///
/// Implementations perform exactly one read per call and never retry.
pub trait DataProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Fetch daily OHLCV bars for a symbol over an inclusive date range.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, ExtractionError>;
}
