//! Integration tests for the schema normalizer.
//!
//! Fixture scenarios (nested two-instrument file, flat single-instrument file)
//! plus property tests that feed staging files written by the extractor's
//! writer back through the normalizer.

use chrono::NaiveDate;
use marketload_core::artifact::{read_canonical, read_manifest};
use marketload_core::extract::staging::write_staging;
use marketload_core::extract::{FetchResult, RawBar};
use marketload_core::normalize::{NormalizationError, UNKNOWN_TICKER};
use marketload_core::record::CANONICAL_COLUMNS;
use marketload_core::{NormalizeOptions, SchemaNormalizer};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

// ── Fixture scenarios ────────────────────────────────────────────────

#[test]
fn nested_two_instruments_yield_six_rows() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = SchemaNormalizer::default()
        .normalize_file(&fixture("nested_two_tickers.csv"), dir.path())
        .unwrap();

    let records = read_canonical(&artifact.path).unwrap();
    assert_eq!(records.len(), 6);

    let tickers: BTreeSet<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers, BTreeSet::from(["AAA", "BBB"]));

    for ticker in ["AAA", "BBB"] {
        let dates: Vec<NaiveDate> = records
            .iter()
            .filter(|r| r.ticker == ticker)
            .map(|r| r.date)
            .collect();
        assert_eq!(dates, vec![d(2024, 10, 1), d(2024, 10, 2), d(2024, 10, 3)]);
    }

    let bbb_last = records
        .iter()
        .find(|r| r.ticker == "BBB" && r.date == d(2024, 10, 3))
        .unwrap();
    assert_eq!(bbb_last.open, 120.75);
    assert_eq!(bbb_last.high_price, 124.25);
    assert_eq!(bbb_last.low_price, 118.75);
    assert_eq!(bbb_last.close, 122.75);
    assert_eq!(bbb_last.volume, 277_118_000);

    assert_eq!(artifact.manifest.row_count, 6);
    assert_eq!(read_manifest(&artifact.path).unwrap(), Some(artifact.manifest));
}

#[test]
fn flat_unnamed_instrument_shares_placeholder_ticker() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = SchemaNormalizer::default()
        .normalize_file(&fixture("flat_single.csv"), dir.path())
        .unwrap();

    let records = read_canonical(&artifact.path).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.ticker == UNKNOWN_TICKER));
    assert_eq!(
        records.iter().map(|r| r.date).collect::<Vec<_>>(),
        vec![d(2024, 10, 1), d(2024, 10, 2), d(2024, 10, 3)]
    );
}

#[test]
fn flat_instrument_takes_caller_supplied_ticker() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = SchemaNormalizer::new(NormalizeOptions::with_flat_ticker("NVDA"))
        .normalize_file(&fixture("flat_single.csv"), dir.path())
        .unwrap();
    assert_eq!(artifact.manifest.tickers, vec!["NVDA"]);
}

#[test]
fn canonical_file_has_exact_header() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = SchemaNormalizer::default()
        .normalize_file(&fixture("nested_two_tickers.csv"), dir.path())
        .unwrap();
    let text = std::fs::read_to_string(&artifact.path).unwrap();
    assert_eq!(text.lines().next().unwrap(), CANONICAL_COLUMNS.join(","));
    assert!(text.lines().nth(1).unwrap().starts_with("AAA,2024-10-01,"));
}

#[test]
fn unknown_layout_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odd.csv");
    std::fs::write(&path, "Symbol,When,Px\nAAA,2024-10-01,1\n").unwrap();
    let err = SchemaNormalizer::default()
        .normalize_file(&path, dir.path())
        .unwrap_err();
    assert!(matches!(err, NormalizationError::UnrecognizedShape(_)), "{err}");
}

#[test]
fn missing_volume_column_is_a_missing_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("novol.csv");
    std::fs::write(&path, "Date,Open,High,Low,Close\n2024-10-01,1,2,0.5,1.5\n").unwrap();
    let err = SchemaNormalizer::default()
        .normalize_file(&path, dir.path())
        .unwrap_err();
    assert!(
        matches!(err, NormalizationError::MissingField { field: "volume", .. }),
        "{err}"
    );
}

#[test]
fn missing_staging_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SchemaNormalizer::default()
        .normalize_file(&dir.path().join("absent.csv"), dir.path())
        .unwrap_err();
    assert!(matches!(err, NormalizationError::Read { .. }));
}

// ── Properties ───────────────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (1.0..1000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_bar(day: u32) -> impl Strategy<Value = RawBar> {
    (arb_price(), arb_price(), arb_price(), arb_price(), 0u64..1_000_000_000).prop_map(
        move |(open, high, low, close, volume)| RawBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i64::from(day)),
            open,
            high,
            low,
            close,
            volume: Some(volume),
            adj_close: close,
        },
    )
}

/// Bars for one instrument on a random subset of 60 consecutive days.
fn arb_bars() -> impl Strategy<Value = Vec<RawBar>> {
    prop::collection::btree_set(0u32..60, 1..20).prop_flat_map(|days| {
        days.into_iter().map(arb_bar).collect::<Vec<_>>()
    })
}

/// One to four instruments with distinct tickers.
fn arb_fetched() -> impl Strategy<Value = Vec<FetchResult>> {
    prop::collection::btree_map("[A-Z]{1,5}", arb_bars(), 1..5).prop_map(|m| {
        m.into_iter()
            .map(|(symbol, bars)| FetchResult { symbol, bars })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every observed (instrument, day) becomes exactly one canonical row
    /// carrying the observed values, and keys are unique.
    #[test]
    fn staging_roundtrips_into_unique_canonical_rows(fetched in arb_fetched()) {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("raw.csv");
        write_staging(&staging, &fetched).unwrap();

        let options = match fetched.as_slice() {
            [only] => NormalizeOptions::with_flat_ticker(only.symbol.clone()),
            _ => NormalizeOptions::default(),
        };
        let artifact = SchemaNormalizer::new(options)
            .normalize_file(&staging, dir.path())
            .unwrap();
        let records = read_canonical(&artifact.path).unwrap();

        let mut expected = BTreeMap::new();
        for f in &fetched {
            for b in &f.bars {
                expected.insert((f.symbol.clone(), b.date), b.clone());
            }
        }
        prop_assert_eq!(records.len(), expected.len());

        let mut keys = HashSet::new();
        for r in &records {
            prop_assert!(keys.insert((r.ticker.clone(), r.date)));
            let bar = &expected[&(r.ticker.clone(), r.date)];
            prop_assert_eq!(r.open, bar.open);
            prop_assert_eq!(r.high_price, bar.high);
            prop_assert_eq!(r.low_price, bar.low);
            prop_assert_eq!(r.close, bar.close);
            prop_assert_eq!(Some(r.volume as u64), bar.volume);
        }

        let tickers: BTreeSet<String> = records.iter().map(|r| r.ticker.clone()).collect();
        let requested: BTreeSet<String> = fetched.iter().map(|f| f.symbol.clone()).collect();
        prop_assert_eq!(tickers, requested);
    }

    /// Timestamped date cells keep the calendar date they were written with.
    #[test]
    fn timestamp_cells_keep_written_date(
        days in prop::collection::btree_set(0i64..3650, 1..10),
        offset_hours in -12i32..=14,
    ) {
        let base = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        let sign = if offset_hours < 0 { '-' } else { '+' };
        let mut text = String::from("Date,Open,High,Low,Close,Volume\n");
        for day in &days {
            let date = base + chrono::Duration::days(*day);
            text.push_str(&format!(
                "{} 00:00:00{sign}{:02}:00,1,2,0.5,1.5,10\n",
                date.format("%Y-%m-%d"),
                offset_hours.abs()
            ));
        }

        let records = SchemaNormalizer::default()
            .normalize_reader(text.as_bytes())
            .unwrap();
        let got: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        let want: Vec<NaiveDate> = days.iter().map(|d| base + chrono::Duration::days(*d)).collect();
        prop_assert_eq!(got, want);
    }
}
