//! CanonicalRecord: the stage-independent row every load consumes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Exact header of a canonical artifact, in column order.
pub const CANONICAL_COLUMNS: [&str; 7] = [
    "ticker",
    "date",
    "open",
    "close",
    "low_price",
    "high_price",
    "volume",
];

/// One daily observation for one instrument.
///
/// Field order matches [`CANONICAL_COLUMNS`]; the CSV writer relies on it.
/// `(ticker, date)` is unique within one canonical artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub low_price: f64,
    pub high_price: f64,
    pub volume: i64,
}

impl CanonicalRecord {
    /// Primary-key view used for uniqueness checks and table ordering.
    pub fn key(&self) -> (&str, NaiveDate) {
        (self.ticker.as_str(), self.date)
    }
}
