//! Staging artifact writer.
//!
//! Two layouts, both CSV with one row per date:
//!
//! Flat (exactly one instrument, identity implicit):
//! ```text
//! Date,Open,High,Low,Close,Adj Close,Volume
//! 2024-10-03,120.92,124.36,118.8,122.85,122.84,277117973
//! ```
//!
//! Nested (field × instrument, two header rows plus an index-name row):
//! ```text
//! Price,Adj Close,Adj Close,Close,Close,...,Volume,Volume
//! Ticker,AVGO,NVDA,AVGO,NVDA,...,AVGO,NVDA
//! Date,,,,,...,,
//! 2024-10-03,172.1,122.84,172.5,122.85,...,19311500,277117973
//! ```
//!
//! Missing values are written as empty cells. Writes are atomic: write to
//! `.tmp` then rename.

use super::provider::{ExtractionError, FetchResult, RawBar};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// File name of the staging artifact inside the staging directory.
pub const STAGING_FILE_NAME: &str = "raw_stock_data.csv";

/// Label in the first cell of the nested layout's field row.
pub const PRICE_LABEL: &str = "Price";
/// Label in the first cell of the nested layout's instrument row.
pub const TICKER_LABEL: &str = "Ticker";
/// Label of the date column (flat) or the index-name row (nested).
pub const DATE_LABEL: &str = "Date";

/// Field order of the nested layout.
pub const NESTED_FIELDS: [&str; 6] = ["Adj Close", "Close", "High", "Low", "Open", "Volume"];
/// Column order of the flat layout after the date column.
pub const FLAT_FIELDS: [&str; 6] = ["Open", "High", "Low", "Close", "Adj Close", "Volume"];

/// Write the staging artifact for the fetched symbols.
///
/// A single symbol produces the flat layout, two or more the nested one.
/// Returns the number of date rows written.
pub fn write_staging(path: &Path, fetched: &[FetchResult]) -> Result<usize, ExtractionError> {
    let buf = match fetched {
        [single] => render_flat(&single.bars)?,
        _ => render_nested(fetched)?,
    };
    let rows = count_dates(fetched);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ExtractionError::StagingWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    fs::write(&tmp_path, buf).map_err(|source| ExtractionError::StagingWrite {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        ExtractionError::StagingWrite {
            path: path.to_path_buf(),
            source,
        }
    })?;

    Ok(rows)
}

fn count_dates(fetched: &[FetchResult]) -> usize {
    let mut dates: Vec<NaiveDate> = fetched
        .iter()
        .flat_map(|f| f.bars.iter().map(|b| b.date))
        .collect();
    dates.sort_unstable();
    dates.dedup();
    dates.len()
}

fn render_flat(bars: &[RawBar]) -> Result<Vec<u8>, ExtractionError> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec![DATE_LABEL];
    header.extend(FLAT_FIELDS);
    wtr.write_record(&header)?;

    let mut sorted: Vec<&RawBar> = bars.iter().collect();
    sorted.sort_by_key(|b| b.date);
    if let Some(pair) = sorted.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(ExtractionError::ResponseFormatChanged(format!(
            "duplicate bar on {}",
            pair[0].date
        )));
    }
    for bar in sorted {
        let mut row = vec![bar.date.format("%Y-%m-%d").to_string()];
        row.extend(FLAT_FIELDS.iter().map(|f| field_cell(Some(bar), f)));
        wtr.write_record(&row)?;
    }

    into_bytes(wtr)
}

fn render_nested(fetched: &[FetchResult]) -> Result<Vec<u8>, ExtractionError> {
    // date -> symbol -> bar
    let mut by_date: BTreeMap<NaiveDate, HashMap<&str, &RawBar>> = BTreeMap::new();
    for result in fetched {
        for bar in &result.bars {
            let day = by_date.entry(bar.date).or_default();
            if day.insert(result.symbol.as_str(), bar).is_some() {
                return Err(ExtractionError::ResponseFormatChanged(format!(
                    "duplicate bar for {} on {}",
                    result.symbol, bar.date
                )));
            }
        }
    }

    let width = 1 + NESTED_FIELDS.len() * fetched.len();
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut field_row = Vec::with_capacity(width);
    let mut ticker_row = Vec::with_capacity(width);
    field_row.push(PRICE_LABEL.to_string());
    ticker_row.push(TICKER_LABEL.to_string());
    for field in NESTED_FIELDS {
        for result in fetched {
            field_row.push(field.to_string());
            ticker_row.push(result.symbol.clone());
        }
    }
    wtr.write_record(&field_row)?;
    wtr.write_record(&ticker_row)?;

    let mut index_row = vec![String::new(); width];
    index_row[0] = DATE_LABEL.to_string();
    wtr.write_record(&index_row)?;

    for (date, day) in &by_date {
        let mut row = Vec::with_capacity(width);
        row.push(date.format("%Y-%m-%d").to_string());
        for field in NESTED_FIELDS {
            for result in fetched {
                let bar = day.get(result.symbol.as_str()).copied();
                row.push(field_cell(bar, field));
            }
        }
        wtr.write_record(&row)?;
    }

    into_bytes(wtr)
}

fn field_cell(bar: Option<&RawBar>, field: &str) -> String {
    let Some(bar) = bar else {
        return String::new();
    };
    match field {
        "Open" => price_cell(bar.open),
        "High" => price_cell(bar.high),
        "Low" => price_cell(bar.low),
        "Close" => price_cell(bar.close),
        "Adj Close" => price_cell(bar.adj_close),
        "Volume" => bar.volume.map(|v| v.to_string()).unwrap_or_default(),
        _ => String::new(),
    }
}

fn price_cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

fn into_bytes(wtr: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ExtractionError> {
    wtr.into_inner()
        .map_err(|e| ExtractionError::Csv(e.into_error().into()))
}
