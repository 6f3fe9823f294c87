//! Staging layout classification.
//!
//! Turns raw CSV records into a tagged [`RawObservationSet`]: the only place
//! that inspects header structure. Everything downstream matches on the variant.

use super::NormalizationError;
use csv::StringRecord;

/// A value column recognised in a staging header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    pub const ALL: [Field; 5] = [Field::Open, Field::High, Field::Low, Field::Close, Field::Volume];

    /// Match a header label, ignoring case, surrounding space and `_` vs ` `.
    /// Returns `None` for columns outside the canonical set (`Adj Close`, ...).
    pub fn from_label(label: &str) -> Option<Field> {
        let norm = label.trim().to_ascii_lowercase().replace('_', " ");
        match norm.as_str() {
            "open" => Some(Field::Open),
            "high" => Some(Field::High),
            "low" => Some(Field::Low),
            "close" => Some(Field::Close),
            "volume" => Some(Field::Volume),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
        }
    }
}

/// Column positions of the five value fields for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldColumns {
    pub open: usize,
    pub high: usize,
    pub low: usize,
    pub close: usize,
    pub volume: usize,
}

impl FieldColumns {
    pub fn get(&self, field: Field) -> usize {
        match field {
            Field::Open => self.open,
            Field::High => self.high,
            Field::Low => self.low,
            Field::Close => self.close,
            Field::Volume => self.volume,
        }
    }
}

#[derive(Debug, Default)]
struct PartialColumns {
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    volume: Option<usize>,
}

impl PartialColumns {
    fn slot(&mut self, field: Field) -> &mut Option<usize> {
        match field {
            Field::Open => &mut self.open,
            Field::High => &mut self.high,
            Field::Low => &mut self.low,
            Field::Close => &mut self.close,
            Field::Volume => &mut self.volume,
        }
    }

    fn finish(self, ticker: Option<&str>) -> Result<FieldColumns, NormalizationError> {
        let missing = |field: Field| NormalizationError::MissingField {
            field: field.label(),
            ticker: ticker.map(String::from),
            line: None,
        };
        Ok(FieldColumns {
            open: self.open.ok_or_else(|| missing(Field::Open))?,
            high: self.high.ok_or_else(|| missing(Field::High))?,
            low: self.low.ok_or_else(|| missing(Field::Low))?,
            close: self.close.ok_or_else(|| missing(Field::Close))?,
            volume: self.volume.ok_or_else(|| missing(Field::Volume))?,
        })
    }
}

/// Single instrument, identity implicit. Column 0 is the date.
#[derive(Debug)]
pub struct FlatObservationSet {
    pub columns: FieldColumns,
    pub rows: Vec<StringRecord>,
}

/// One instrument's column group inside a nested layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentColumns {
    pub ticker: String,
    pub columns: FieldColumns,
}

/// Field × instrument layout. Column 0 is the date.
#[derive(Debug)]
pub struct NestedObservationSet {
    pub instruments: Vec<InstrumentColumns>,
    pub rows: Vec<StringRecord>,
}

/// A classified staging artifact.
#[derive(Debug)]
pub enum RawObservationSet {
    Flat(FlatObservationSet),
    Nested(NestedObservationSet),
}

impl RawObservationSet {
    pub fn row_count(&self) -> usize {
        match self {
            RawObservationSet::Flat(f) => f.rows.len(),
            RawObservationSet::Nested(n) => n.rows.len(),
        }
    }
}

fn first_cell_is(record: &StringRecord, labels: &[&str]) -> bool {
    record
        .get(0)
        .map(|c| labels.iter().any(|l| c.trim().eq_ignore_ascii_case(l)))
        .unwrap_or(false)
}

fn is_index_name_row(record: &StringRecord) -> bool {
    first_cell_is(record, &["date", "datetime"]) && record.iter().skip(1).all(|c| c.trim().is_empty())
}

/// Classify raw records (header rows included) into a tagged layout.
pub fn classify(mut records: Vec<StringRecord>) -> Result<RawObservationSet, NormalizationError> {
    if records.is_empty() {
        return Err(NormalizationError::UnrecognizedShape(
            "artifact has no header".into(),
        ));
    }

    let nested = records.len() >= 2 && first_cell_is(&records[1], &["ticker"]);
    if nested {
        let mut header_rows = 2;
        if records.len() >= 3 && is_index_name_row(&records[2]) {
            header_rows = 3;
        }
        let rows = records.split_off(header_rows);
        let instruments = nested_columns(&records[0], &records[1])?;
        return Ok(RawObservationSet::Nested(NestedObservationSet { instruments, rows }));
    }

    if first_cell_is(&records[0], &["price"]) {
        return Err(NormalizationError::UnrecognizedShape(
            "field header row is not followed by a ticker row".into(),
        ));
    }

    if first_cell_is(&records[0], &["date", "datetime"]) {
        let rows = records.split_off(1);
        let columns = flat_columns(&records[0])?;
        return Ok(RawObservationSet::Flat(FlatObservationSet { columns, rows }));
    }

    Err(NormalizationError::UnrecognizedShape(format!(
        "first header cell '{}' is neither a date column nor a field axis",
        records[0].get(0).unwrap_or("")
    )))
}

fn flat_columns(header: &StringRecord) -> Result<FieldColumns, NormalizationError> {
    let mut cols = PartialColumns::default();
    for (idx, label) in header.iter().enumerate().skip(1) {
        if let Some(field) = Field::from_label(label) {
            let slot = cols.slot(field);
            if slot.is_some() {
                return Err(NormalizationError::UnrecognizedShape(format!(
                    "duplicate '{}' column",
                    field.label()
                )));
            }
            *slot = Some(idx);
        }
    }
    cols.finish(None)
}

fn nested_columns(
    fields: &StringRecord,
    tickers: &StringRecord,
) -> Result<Vec<InstrumentColumns>, NormalizationError> {
    if fields.len() != tickers.len() {
        return Err(NormalizationError::UnrecognizedShape(
            "field and ticker header rows differ in width".into(),
        ));
    }

    // Instruments in first-seen order.
    let mut groups: Vec<(String, PartialColumns)> = Vec::new();
    for (idx, (label, ticker)) in fields.iter().zip(tickers.iter()).enumerate().skip(1) {
        let Some(field) = Field::from_label(label) else {
            continue;
        };
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(NormalizationError::UnrecognizedShape(format!(
                "column {} ('{label}') has no instrument",
                idx + 1
            )));
        }
        let pos = match groups.iter().position(|(t, _)| t == ticker) {
            Some(pos) => pos,
            None => {
                groups.push((ticker.to_string(), PartialColumns::default()));
                groups.len() - 1
            }
        };
        let slot = groups[pos].1.slot(field);
        if slot.is_some() {
            return Err(NormalizationError::UnrecognizedShape(format!(
                "duplicate '{}' column for {ticker}",
                field.label()
            )));
        }
        *slot = Some(idx);
    }

    if groups.is_empty() {
        return Err(NormalizationError::UnrecognizedShape(
            "nested header names no instruments".into(),
        ));
    }

    groups
        .into_iter()
        .map(|(ticker, cols)| {
            let columns = cols.finish(Some(&ticker))?;
            Ok(InstrumentColumns { ticker, columns })
        })
        .collect()
}
