//! Canonical artifact: CSV file plus a JSON metadata sidecar.
//!
//! Layout: `{dir}/clean_stock_data.csv` and `{dir}/clean_stock_data.meta.json`.
//!
//! - Header is exactly `ticker,date,open,close,low_price,high_price,volume`
//! - Atomic writes (write to .tmp, rename into place)
//! - Sidecar records row count, tickers, date range and a BLAKE3 content hash;
//!   readers verify the hash when the sidecar is present

use crate::record::{CanonicalRecord, CANONICAL_COLUMNS};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the canonical artifact inside the staging directory.
pub const CANONICAL_FILE_NAME: &str = "clean_stock_data.csv";

/// Errors reading or writing a canonical artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("canonical CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("canonical header mismatch: expected '{expected}', found '{found}'")]
    Header { expected: String, found: String },

    #[error("duplicate (ticker, date) in canonical artifact: ({ticker}, {date})")]
    DuplicateKey { ticker: String, date: NaiveDate },

    #[error("metadata sidecar: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("content hash mismatch for {path}: sidecar says {expected}, file hashes to {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Metadata sidecar written next to every canonical artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalManifest {
    pub row_count: usize,
    pub tickers: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub data_hash: String,
    pub created_at: chrono::NaiveDateTime,
}

/// Path of the sidecar for an artifact: `foo.csv` → `foo.meta.json`.
pub fn manifest_path(artifact: &Path) -> PathBuf {
    artifact.with_extension("meta.json")
}

/// Write records as a canonical artifact and its sidecar.
pub fn write_canonical(
    path: &Path,
    records: &[CanonicalRecord],
) -> Result<CanonicalManifest, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    if records.is_empty() {
        wtr.write_record(CANONICAL_COLUMNS)?;
    }
    for record in records {
        wtr.serialize(record)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| ArtifactError::Csv(e.into_error().into()))?;

    let tickers: BTreeSet<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    let manifest = CanonicalManifest {
        row_count: records.len(),
        tickers: tickers.into_iter().map(String::from).collect(),
        start_date: records.iter().map(|r| r.date).min(),
        end_date: records.iter().map(|r| r.date).max(),
        data_hash: blake3::hash(&bytes).to_hex().to_string(),
        created_at: chrono::Local::now().naive_local(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
            action: "create dir",
            path: parent.to_path_buf(),
            source,
        })?;
    }
    atomic_write(path, &bytes)?;
    atomic_write(
        &manifest_path(path),
        serde_json::to_string_pretty(&manifest)?.as_bytes(),
    )?;

    Ok(manifest)
}

/// Read a canonical artifact, checking header, key uniqueness and, when the
/// sidecar exists, the content hash.
pub fn read_canonical(path: &Path) -> Result<Vec<CanonicalRecord>, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        action: "read",
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(manifest) = read_manifest(path)? {
        let actual = blake3::hash(&bytes).to_hex().to_string();
        if actual != manifest.data_hash {
            return Err(ArtifactError::HashMismatch {
                path: path.to_path_buf(),
                expected: manifest.data_hash,
                actual,
            });
        }
    }

    let mut rdr = csv::Reader::from_reader(bytes.as_slice());
    let header = rdr.headers()?.clone();
    if header.iter().ne(CANONICAL_COLUMNS) {
        return Err(ArtifactError::Header {
            expected: CANONICAL_COLUMNS.join(","),
            found: header.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for row in rdr.deserialize() {
        let record: CanonicalRecord = row?;
        if !seen.insert((record.ticker.clone(), record.date)) {
            return Err(ArtifactError::DuplicateKey {
                ticker: record.ticker,
                date: record.date,
            });
        }
        records.push(record);
    }
    Ok(records)
}

/// Read the sidecar for an artifact, if one was written.
pub fn read_manifest(artifact: &Path) -> Result<Option<CanonicalManifest>, ArtifactError> {
    let path = manifest_path(artifact);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ArtifactError::Io {
            action: "read",
            path,
            source,
        }),
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes).map_err(|source| ArtifactError::Io {
        action: "write",
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        ArtifactError::Io {
            action: "rename",
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ticker: &str, day: u32) -> CanonicalRecord {
        CanonicalRecord {
            ticker: ticker.into(),
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            open: 10.0 + day as f64,
            close: 10.5 + day as f64,
            low_price: 9.5 + day as f64,
            high_price: 11.0 + day as f64,
            volume: 1_000 * day as i64,
        }
    }

    #[test]
    fn write_then_read_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CANONICAL_FILE_NAME);
        let records = vec![record("AAA", 1), record("AAA", 2), record("BBB", 1)];

        let manifest = write_canonical(&path, &records).unwrap();
        assert_eq!(manifest.row_count, 3);
        assert_eq!(manifest.tickers, vec!["AAA", "BBB"]);
        assert_eq!(manifest.start_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(manifest.end_date, NaiveDate::from_ymd_opt(2024, 5, 2));
        assert!(manifest_path(&path).exists());

        assert_eq!(read_canonical(&path).unwrap(), records);
    }

    #[test]
    fn empty_artifact_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CANONICAL_FILE_NAME);
        write_canonical(&path, &[]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), CANONICAL_COLUMNS.join(","));
        assert!(read_canonical(&path).unwrap().is_empty());
    }

    #[test]
    fn tampered_artifact_fails_hash_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CANONICAL_FILE_NAME);
        write_canonical(&path, &[record("AAA", 1)]).unwrap();

        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("AAA,2024-05-09,1,1,1,1,1\n");
        fs::write(&path, text).unwrap();

        let err = read_canonical(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::HashMismatch { .. }));
    }

    #[test]
    fn header_must_match_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handmade.csv");
        fs::write(
            &path,
            "symbol,date,open,close,low_price,high_price,volume\nAAA,2024-05-01,1,1,1,1,1\n",
        )
        .unwrap();
        let err = read_canonical(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::Header { .. }));
    }

    #[test]
    fn duplicate_keys_are_rejected_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handmade.csv");
        fs::write(
            &path,
            "ticker,date,open,close,low_price,high_price,volume\n\
             AAA,2024-05-01,1,1,1,1,1\n\
             AAA,2024-05-01,2,2,2,2,2\n",
        )
        .unwrap();
        let err = read_canonical(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::DuplicateKey { .. }));
    }

    #[test]
    fn handwritten_artifact_without_sidecar_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handmade.csv");
        fs::write(
            &path,
            "ticker,date,open,close,low_price,high_price,volume\nAAA,2024-05-01,1.5,2,1,2.5,300\n",
        )
        .unwrap();
        let records = read_canonical(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].volume, 300);
        assert_eq!(records[0].open, 1.5);
    }
}
