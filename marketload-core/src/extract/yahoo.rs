//! Yahoo Finance provider (v8 chart endpoint).
//!
//! One HTTP request per symbol and no retry. A failed fetch fails the run;
//! the scheduler decides whether to try again. The endpoint is unofficial and
//! its payload can change without notice, which surfaces as
//! [`ExtractionError::ResponseFormatChanged`].

use super::provider::{DataProvider, ExtractionError, FetchResult, RawBar};
use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const CHART_ENDPOINT: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) marketload";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct Envelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<Series>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct Series {
    /// Absent when the range holds no trading days.
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Quote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: Client,
}

impl YahooProvider {
    pub fn new() -> Result<Self, ExtractionError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ExtractionError::NetworkUnreachable(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

/// `period2` is exclusive, so it points at midnight after `end`.
fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
    let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc().timestamp();
    let period1 = midnight(start);
    let period2 = midnight(end.succ_opt().unwrap_or(end));
    format!(
        "{CHART_ENDPOINT}/{symbol}?period1={period1}&period2={period2}\
         &interval=1d&includeAdjustedClose=true"
    )
}

/// Turn a non-success status into the matching extraction error.
fn check_status(symbol: &str, resp: &Response) -> Result<(), ExtractionError> {
    match resp.status() {
        s if s.is_success() => Ok(()),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            Err(ExtractionError::RateLimited { retry_after_secs })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
            ExtractionError::AuthenticationRequired(format!("{symbol}: HTTP {}", resp.status())),
        ),
        StatusCode::NOT_FOUND => Err(ExtractionError::SymbolNotFound {
            symbol: symbol.to_string(),
        }),
        s => Err(ExtractionError::Http {
            symbol: symbol.to_string(),
            status: s.as_u16(),
        }),
    }
}

/// Pick the single series out of a chart payload.
fn into_series(symbol: &str, envelope: Envelope) -> Result<Series, ExtractionError> {
    let Chart { result, error } = envelope.chart;
    match (result, error) {
        (Some(series), _) => series.into_iter().next().ok_or_else(|| {
            ExtractionError::ResponseFormatChanged(format!("{symbol}: empty result array"))
        }),
        (None, Some(e)) if e.code == "Not Found" => Err(ExtractionError::SymbolNotFound {
            symbol: symbol.to_string(),
        }),
        (None, Some(e)) => Err(ExtractionError::ResponseFormatChanged(format!(
            "{symbol}: {}: {}",
            e.code, e.description
        ))),
        (None, None) => Err(ExtractionError::ResponseFormatChanged(format!(
            "{symbol}: neither result nor error in payload"
        ))),
    }
}

/// Zip the parallel quote arrays into bars. Days on which every OHLCV value
/// is null (halts, holidays) are dropped; remaining gaps become NaN/`None`.
fn bars_from(series: Series) -> Result<Vec<RawBar>, ExtractionError> {
    let Series {
        timestamp,
        indicators,
    } = series;
    let quote = indicators.quote.into_iter().next().ok_or_else(|| {
        ExtractionError::ResponseFormatChanged("indicators carry no quote block".into())
    })?;
    let adjclose = indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(timestamp.len());
    for (i, ts) in timestamp.into_iter().enumerate() {
        let (open, high, low, close) = (
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
        );
        let volume = quote.volume.get(i).copied().flatten();
        if [open, high, low, close].iter().all(Option::is_none) && volume.is_none() {
            continue;
        }

        let date = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| {
                ExtractionError::ResponseFormatChanged(format!("timestamp out of range: {ts}"))
            })?;

        bars.push(RawBar {
            date,
            open: open.unwrap_or(f64::NAN),
            high: high.unwrap_or(f64::NAN),
            low: low.unwrap_or(f64::NAN),
            close: close.unwrap_or(f64::NAN),
            volume,
            adj_close: at(&adjclose, i).unwrap_or(f64::NAN),
        });
    }
    Ok(bars)
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, ExtractionError> {
        let url = chart_url(symbol, start, end);
        debug!(%symbol, %url, "GET chart");

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| ExtractionError::NetworkUnreachable(format!("{symbol}: {e}")))?;
        check_status(symbol, &resp)?;

        let envelope: Envelope = resp.json().map_err(|e| {
            ExtractionError::ResponseFormatChanged(format!("{symbol}: undecodable chart: {e}"))
        })?;
        let bars = bars_from(into_series(symbol, envelope)?)?;

        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
        })
    }
}
