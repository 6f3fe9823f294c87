//! Integration tests for the full-refresh load.
//!
//! Each scenario runs against in-memory DuckDB and against the in-process
//! warehouse: first load into an empty table, replacement by a different
//! set, idempotence, and rollback on a mid-load failure.

use chrono::NaiveDate;
use marketload_core::artifact::write_canonical;
use marketload_core::load::{
    DuckDbWarehouse, MemoryWarehouse, Statement, TransactionScope, Warehouse,
};
use marketload_core::{CanonicalRecord, LoadCoordinator, LoadError, TableName};

fn rec(ticker: &str, day: u32, close: f64) -> CanonicalRecord {
    CanonicalRecord {
        ticker: ticker.into(),
        date: NaiveDate::from_ymd_opt(2024, 10, day).unwrap(),
        open: close - 1.5,
        close,
        low_price: close - 2.25,
        high_price: close + 1.75,
        volume: 1_000_000 + i64::from(day),
    }
}

fn six_rows() -> Vec<CanonicalRecord> {
    vec![
        rec("AAA", 1, 171.5),
        rec("AAA", 2, 172.25),
        rec("AAA", 3, 172.75),
        rec("BBB", 1, 117.0),
        rec("BBB", 2, 118.75),
        rec("BBB", 3, 122.75),
    ]
}

fn four_rows() -> Vec<CanonicalRecord> {
    vec![
        rec("AAA", 7, 180.0),
        rec("AAA", 8, 181.5),
        rec("CCC", 7, 50.25),
        rec("CCC", 8, 51.0),
    ]
}

fn table() -> TableName {
    TableName::parse("raw.lab1_market_data").unwrap()
}

fn coordinator() -> LoadCoordinator {
    LoadCoordinator::new(table()).with_batch_size(2)
}

/// Read access shared by both warehouses.
trait Inspect: Warehouse {
    fn contents(&self) -> Vec<CanonicalRecord>;
}

impl Inspect for DuckDbWarehouse {
    fn contents(&self) -> Vec<CanonicalRecord> {
        self.snapshot(&table()).unwrap()
    }
}

impl Inspect for MemoryWarehouse {
    fn contents(&self) -> Vec<CanonicalRecord> {
        self.rows(&table())
    }
}

fn sorted(mut records: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
    records.sort_by(|a, b| (a.ticker.as_str(), a.date).cmp(&(b.ticker.as_str(), b.date)));
    records
}

// ── Scenario bodies ──────────────────────────────────────────────────

fn first_load_fills_empty_table<W: Inspect>(wh: &mut W) {
    let summary = coordinator().load(wh, &six_rows()).unwrap();
    assert_eq!(summary.rows_deleted, 0);
    assert_eq!(summary.rows_inserted, 6);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.table, "raw.lab1_market_data");
    assert_eq!(wh.contents(), sorted(six_rows()));
}

fn second_load_replaces_everything<W: Inspect>(wh: &mut W) {
    coordinator().load(wh, &six_rows()).unwrap();
    let summary = coordinator().load(wh, &four_rows()).unwrap();
    assert_eq!(summary.rows_deleted, 6);
    assert_eq!(summary.rows_inserted, 4);
    assert_eq!(wh.contents(), sorted(four_rows()));
}

fn loading_twice_equals_loading_once<W: Inspect>(wh: &mut W) {
    coordinator().load(wh, &six_rows()).unwrap();
    let once = wh.contents();
    coordinator().load(wh, &six_rows()).unwrap();
    assert_eq!(wh.contents(), once);
}

fn failed_insert_restores_previous_contents<W: Inspect>(wh: &mut W) {
    coordinator().load(wh, &six_rows()).unwrap();
    let before = wh.contents();

    // Ten rows; the fifth repeats the fourth's key.
    let mut rows: Vec<CanonicalRecord> = (10..20).map(|d| rec("ZZZ", d, 10.0)).collect();
    rows[4] = rows[3].clone();

    let err = coordinator().load(wh, &rows).unwrap_err();
    assert!(matches!(err, LoadError::Constraint { .. }), "{err}");
    assert_eq!(wh.contents(), before);

    // The warehouse is usable again after the rollback.
    coordinator().load(wh, &four_rows()).unwrap();
    assert_eq!(wh.contents(), sorted(four_rows()));
}

fn dropped_scope_rolls_back<W: Inspect>(wh: &mut W) {
    coordinator().load(wh, &six_rows()).unwrap();
    let t = table();
    {
        let mut tx = TransactionScope::begin(&mut *wh).unwrap();
        tx.execute(&Statement::DeleteAll(&t)).unwrap();
    }
    assert_eq!(wh.contents(), sorted(six_rows()));
}

// ── DuckDB ───────────────────────────────────────────────────────────

fn duck() -> DuckDbWarehouse {
    DuckDbWarehouse::open_in_memory().unwrap()
}

#[test]
fn duckdb_first_load_fills_empty_table() {
    first_load_fills_empty_table(&mut duck());
}

#[test]
fn duckdb_second_load_replaces_everything() {
    second_load_replaces_everything(&mut duck());
}

#[test]
fn duckdb_loading_twice_equals_loading_once() {
    loading_twice_equals_loading_once(&mut duck());
}

#[test]
fn duckdb_failed_insert_restores_previous_contents() {
    failed_insert_restores_previous_contents(&mut duck());
}

#[test]
fn duckdb_dropped_scope_rolls_back() {
    dropped_scope_rolls_back(&mut duck());
}

#[test]
fn duckdb_load_from_artifact_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clean_stock_data.csv");
    write_canonical(&path, &six_rows()).unwrap();

    let db = dir.path().join("prices.duckdb");
    {
        let mut wh = DuckDbWarehouse::open(&db).unwrap();
        let summary = coordinator().load_artifact(&mut wh, &path).unwrap();
        assert_eq!(summary.rows_inserted, 6);
    }
    let wh = DuckDbWarehouse::open(&db).unwrap();
    assert_eq!(wh.row_count(&table()).unwrap(), 6);
}

// ── In-process warehouse ─────────────────────────────────────────────

#[test]
fn memory_first_load_fills_empty_table() {
    first_load_fills_empty_table(&mut MemoryWarehouse::new());
}

#[test]
fn memory_second_load_replaces_everything() {
    second_load_replaces_everything(&mut MemoryWarehouse::new());
}

#[test]
fn memory_loading_twice_equals_loading_once() {
    loading_twice_equals_loading_once(&mut MemoryWarehouse::new());
}

#[test]
fn memory_failed_insert_restores_previous_contents() {
    failed_insert_restores_previous_contents(&mut MemoryWarehouse::new());
}

#[test]
fn memory_dropped_scope_rolls_back() {
    dropped_scope_rolls_back(&mut MemoryWarehouse::new());
}

#[test]
fn failure_at_any_step_leaves_table_untouched() {
    for (kind, nth) in [
        ("CREATE SCHEMA", 2),
        ("CREATE TABLE", 2),
        ("DELETE", 2),
        ("INSERT", 4),
        ("COMMIT", 2),
    ] {
        let mut wh = MemoryWarehouse::new().fail_on(kind, nth);
        coordinator().load(&mut wh, &six_rows()).unwrap();

        let err = coordinator().load(&mut wh, &four_rows()).unwrap_err();
        assert_eq!(wh.rows(&table()), sorted(six_rows()), "failure on {kind}: {err}");
        assert!(!wh.in_transaction(), "failure on {kind} left a transaction open");
    }
}

#[test]
fn load_through_trait_object() {
    let mut boxed: Box<dyn Warehouse> = Box::new(MemoryWarehouse::new());
    let summary = coordinator().load(boxed.as_mut(), &six_rows()).unwrap();
    assert_eq!(summary.rows_inserted, 6);
}
