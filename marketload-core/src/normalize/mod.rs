//! SchemaNormalizer: staging artifact in, canonical artifact out.
//!
//! Pure function of the artifact's content and [`NormalizeOptions`]:
//! classify the layout, unpivot to one record per (ticker, date), project to
//! the canonical columns, normalise dates, then write.

pub mod date;
pub mod shape;

pub use shape::{Field, FieldColumns, FlatObservationSet, NestedObservationSet, RawObservationSet};

use crate::artifact::{self, ArtifactError, CanonicalManifest, CANONICAL_FILE_NAME};
use crate::record::CanonicalRecord;
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Ticker assigned to flat rows when the caller does not say which instrument
/// the artifact holds. Rows carrying it are mislabelled by construction.
pub const UNKNOWN_TICKER: &str = "UNKNOWN";

/// Errors raised while normalizing a staging artifact.
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("unrecognized staging layout: {0}")]
    UnrecognizedShape(String),

    #[error("missing required field '{field}'{}{}", fmt_ticker(ticker), fmt_line(*line))]
    MissingField {
        field: &'static str,
        ticker: Option<String>,
        line: Option<u64>,
    },

    #[error("invalid {field} value '{value}'{}", fmt_line(Some(*line)))]
    InvalidNumber {
        field: &'static str,
        value: String,
        line: u64,
    },

    #[error("invalid date '{value}'{}", fmt_line(Some(*line)))]
    InvalidDate { value: String, line: u64 },

    #[error("duplicate (ticker, date) pair: ({ticker}, {date})")]
    DuplicateKey { ticker: String, date: NaiveDate },

    #[error("staging artifact contains no observations")]
    NoObservations,

    #[error("read staging artifact {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("staging CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

fn fmt_ticker(ticker: &Option<String>) -> String {
    ticker
        .as_ref()
        .map(|t| format!(" for {t}"))
        .unwrap_or_default()
}

fn fmt_line(line: Option<u64>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

/// Caller-supplied context the artifact itself cannot carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Ticker for flat (single-instrument) artifacts. `None` falls back to
    /// [`UNKNOWN_TICKER`] with a warning.
    pub flat_ticker: Option<String>,
}

impl NormalizeOptions {
    pub fn with_flat_ticker(ticker: impl Into<String>) -> Self {
        Self {
            flat_ticker: Some(ticker.into()),
        }
    }
}

/// Location and summary of a written canonical artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalArtifact {
    pub path: PathBuf,
    pub manifest: CanonicalManifest,
}

/// Reads a staging artifact and writes its canonical form.
#[derive(Debug, Clone, Default)]
pub struct SchemaNormalizer {
    options: NormalizeOptions,
}

impl SchemaNormalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Normalize `staging` and write the canonical artifact into `out_dir`.
    pub fn normalize_file(
        &self,
        staging: &Path,
        out_dir: &Path,
    ) -> Result<CanonicalArtifact, NormalizationError> {
        let file = std::fs::File::open(staging).map_err(|source| NormalizationError::Read {
            path: staging.to_path_buf(),
            source,
        })?;
        let records = self.normalize_reader(file)?;

        let path = out_dir.join(CANONICAL_FILE_NAME);
        let manifest = artifact::write_canonical(&path, &records)?;
        info!(
            path = %path.display(),
            rows = manifest.row_count,
            tickers = ?manifest.tickers,
            "wrote canonical artifact"
        );
        Ok(CanonicalArtifact { path, manifest })
    }

    /// Normalize staging CSV content into canonical records, sorted by (ticker, date).
    pub fn normalize_reader<R: Read>(
        &self,
        reader: R,
    ) -> Result<Vec<CanonicalRecord>, NormalizationError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let raw: Vec<StringRecord> = rdr.records().collect::<Result<_, _>>()?;
        let set = shape::classify(raw)?;
        self.normalize_set(set)
    }

    /// Unpivot a classified layout into canonical records.
    pub fn normalize_set(
        &self,
        set: RawObservationSet,
    ) -> Result<Vec<CanonicalRecord>, NormalizationError> {
        let mut records = match set {
            RawObservationSet::Flat(flat) => self.normalize_flat(flat)?,
            RawObservationSet::Nested(nested) => normalize_nested(nested)?,
        };
        if records.is_empty() {
            return Err(NormalizationError::NoObservations);
        }

        {
            let mut seen = HashSet::with_capacity(records.len());
            for r in &records {
                if !seen.insert(r.key()) {
                    return Err(NormalizationError::DuplicateKey {
                        ticker: r.ticker.clone(),
                        date: r.date,
                    });
                }
            }
        }

        records.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(records)
    }

    fn normalize_flat(
        &self,
        flat: FlatObservationSet,
    ) -> Result<Vec<CanonicalRecord>, NormalizationError> {
        let ticker = match &self.options.flat_ticker {
            Some(t) => t.clone(),
            None => {
                warn!(
                    placeholder = UNKNOWN_TICKER,
                    "flat staging artifact has no instrument identity; rows get a placeholder ticker"
                );
                UNKNOWN_TICKER.to_string()
            }
        };

        let mut out = Vec::with_capacity(flat.rows.len());
        for row in &flat.rows {
            let line = line_of(row);
            let date = row_date(row, line)?;
            if let Some(record) = project(row, &flat.columns, &ticker, date, line)? {
                out.push(record);
            }
        }
        Ok(out)
    }
}

fn normalize_nested(
    nested: NestedObservationSet,
) -> Result<Vec<CanonicalRecord>, NormalizationError> {
    let mut out = Vec::with_capacity(nested.rows.len() * nested.instruments.len());
    for row in &nested.rows {
        let line = line_of(row);
        let date = row_date(row, line)?;
        for inst in &nested.instruments {
            if let Some(record) = project(row, &inst.columns, &inst.ticker, date, line)? {
                out.push(record);
            }
        }
    }
    Ok(out)
}

fn line_of(row: &StringRecord) -> u64 {
    row.position().map(|p| p.line()).unwrap_or(0)
}

fn row_date(row: &StringRecord, line: u64) -> Result<NaiveDate, NormalizationError> {
    let raw = row.get(0).unwrap_or("");
    date::parse_calendar_date(raw).ok_or_else(|| NormalizationError::InvalidDate {
        value: raw.to_string(),
        line,
    })
}

/// Project one instrument's cells of a row onto a canonical record.
///
/// `Ok(None)` when every value cell is empty (instrument did not trade that
/// day). A partially empty group is a missing field.
fn project(
    row: &StringRecord,
    cols: &FieldColumns,
    ticker: &str,
    date: NaiveDate,
    line: u64,
) -> Result<Option<CanonicalRecord>, NormalizationError> {
    let cell = |field: Field| row.get(cols.get(field)).unwrap_or("");

    if Field::ALL.iter().all(|&f| cell(f).is_empty()) {
        return Ok(None);
    }

    let price = |field: Field| -> Result<f64, NormalizationError> {
        let raw = cell(field);
        if raw.is_empty() {
            return Err(NormalizationError::MissingField {
                field: field.label(),
                ticker: Some(ticker.to_string()),
                line: Some(line),
            });
        }
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| NormalizationError::InvalidNumber {
                field: field.label(),
                value: raw.to_string(),
                line,
            })
    };

    let open = price(Field::Open)?;
    let high = price(Field::High)?;
    let low = price(Field::Low)?;
    let close = price(Field::Close)?;

    let raw_volume = cell(Field::Volume);
    if raw_volume.is_empty() {
        return Err(NormalizationError::MissingField {
            field: Field::Volume.label(),
            ticker: Some(ticker.to_string()),
            line: Some(line),
        });
    }
    let volume = parse_volume(raw_volume).ok_or_else(|| NormalizationError::InvalidNumber {
        field: Field::Volume.label(),
        value: raw_volume.to_string(),
        line,
    })?;

    Ok(Some(CanonicalRecord {
        ticker: ticker.to_string(),
        date,
        open,
        close,
        low_price: low,
        high_price: high,
        volume,
    }))
}

/// Volumes are whole, non-negative share counts. Accepts float spellings of
/// whole numbers (`277117973.0`), which pandas writes for columns with gaps.
fn parse_volume(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return (v >= 0).then_some(v);
    }
    let v = raw.parse::<f64>().ok()?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}
