// 📂 Loader - CSV files and uploads → validated datasets, datasets → CSV bytes

use crate::schema::{DatasetKind, ParseError, Record, SchemaError, SchemaValidator};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Where a dataset's bytes came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    Sample { path: PathBuf },
    Upload { name: String },
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Sample { path } => write!(f, "sample {}", path.display()),
            DataSource::Upload { name } => write!(f, "upload {}", name),
        }
    }
}

/// A loaded, immutable dataset. Replaced wholesale on re-upload.
#[derive(Debug, Clone)]
pub struct Dataset<T> {
    pub kind: DatasetKind,
    pub source: DataSource,
    pub records: Vec<T>,
    pub skipped: Vec<ParseError>,
    /// SHA-256 of the raw bytes
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

impl<T> Dataset<T> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Validate raw CSV bytes (an upload, or a file already read into memory).
pub fn load_bytes<T: Record>(
    validator: &SchemaValidator,
    source: DataSource,
    bytes: &[u8],
) -> Result<Dataset<T>, LoadError> {
    let kind = T::KIND;
    let validated = validator.validate::<T, _>(bytes).map_err(|e| {
        warn!(dataset = %kind, source = %source, error = %e, "schema check failed");
        e
    })?;

    if !validated.skipped.is_empty() {
        warn!(
            dataset = %kind,
            skipped = validated.skipped.len(),
            first = %validated.skipped[0],
            "skipped malformed rows"
        );
    }
    info!(
        dataset = %kind,
        source = %source,
        records = validated.records.len(),
        "dataset loaded"
    );

    Ok(Dataset {
        kind,
        source,
        records: validated.records,
        skipped: validated.skipped,
        fingerprint: fingerprint(bytes),
        loaded_at: Utc::now(),
    })
}

/// Read a CSV file fully, release the handle, then validate.
pub fn load_path<T: Record>(
    validator: &SchemaValidator,
    path: &Path,
) -> Result<Dataset<T>, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    load_bytes(
        validator,
        DataSource::Sample {
            path: path.to_path_buf(),
        },
        &bytes,
    )
}

/// Serialize records back to CSV, header row included.
pub fn to_csv_bytes<T: Serialize>(records: &[T]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    for record in records {
        wtr.serialize(record).context("Failed to serialize record")?;
    }

    wtr.into_inner().context("Failed to flush CSV writer")
}

/// Like `to_csv_bytes`, but writes just the header when there are no rows.
pub fn to_csv_bytes_with_header<T: Record>(records: &[T]) -> Result<Vec<u8>> {
    if !records.is_empty() {
        return to_csv_bytes(records);
    }

    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(T::KIND.columns().iter().map(|c| c.name))
        .context("Failed to write CSV header")?;
    wtr.into_inner().context("Failed to flush CSV writer")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{FlowRecord, IpType, PphRecord};
    use std::io::Write;

    const FLOWS: &str = "year,origin_country,dest_country,ip_type,applications\n\
                         2020,CA,JP,patent,10\n\
                         2021,CA,JP,trademark,5\n";

    fn validator() -> SchemaValidator {
        SchemaValidator::with_year_bounds(1900, 2100)
    }

    #[test]
    fn test_load_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FLOWS.as_bytes()).unwrap();

        let dataset: Dataset<FlowRecord> = load_path(&validator(), file.path()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.kind, DatasetKind::Flows);
        assert_eq!(dataset.fingerprint, fingerprint(FLOWS.as_bytes()));
        assert!(matches!(dataset.source, DataSource::Sample { .. }));
    }

    #[test]
    fn test_load_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_path::<FlowRecord>(&validator(), &dir.path().join("nope.csv")).unwrap_err();

        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_load_bytes_schema_error_passes_through() {
        let err = load_bytes::<PphRecord>(
            &validator(),
            DataSource::Upload { name: "pph.csv".to_string() },
            b"year,requests\n2020,1\n",
        )
        .unwrap_err();

        match err {
            LoadError::Schema(SchemaError::MissingColumns { missing, .. }) => {
                assert_eq!(missing, vec!["direction"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(fingerprint(b"").len(), 64);
    }

    #[test]
    fn test_csv_export_reloads_to_same_records() {
        let dataset: Dataset<FlowRecord> = load_bytes(
            &validator(),
            DataSource::Upload { name: "flows.csv".to_string() },
            FLOWS.as_bytes(),
        )
        .unwrap();

        let bytes = to_csv_bytes(&dataset.records).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("year,origin_country,dest_country,ip_type,applications\n"));
        assert!(text.contains("2021,CA,JP,trademark,5"));

        let reloaded: Dataset<FlowRecord> = load_bytes(
            &validator(),
            DataSource::Upload { name: "again.csv".to_string() },
            &bytes,
        )
        .unwrap();
        assert_eq!(reloaded.records, dataset.records);
        assert_eq!(reloaded.records[1].ip_type, IpType::Trademark);
    }

    #[test]
    fn test_pph_direction_written_with_arrow() {
        let dataset: Dataset<PphRecord> = load_bytes(
            &validator(),
            DataSource::Upload { name: "pph.csv".to_string() },
            "year,direction,requests\n2020,CIPO->JPO,4\n".as_bytes(),
        )
        .unwrap();

        let text = String::from_utf8(to_csv_bytes(&dataset.records).unwrap()).unwrap();
        assert_eq!(text, "year,direction,requests\n2020,CIPO→JPO,4\n");
    }

    #[test]
    fn test_empty_export_keeps_header() {
        let text = String::from_utf8(to_csv_bytes_with_header::<FlowRecord>(&[]).unwrap()).unwrap();
        assert_eq!(text, "year,origin_country,dest_country,ip_type,applications\n");
    }
}
