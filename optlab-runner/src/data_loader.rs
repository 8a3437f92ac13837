//! Historical data loading for the runner.
//!
//! A history file is a CSV with one row per bar: a timestamp column, the
//! underlying price column, an optional category column and any number of
//! numeric feature columns. Rows are kept even when cells are blank or NaN;
//! the engine rejects such rows explicitly instead of the loader dropping
//! them silently.
//!
//! Synthetic data is a developer-only debug mode. Results produced on
//! synthetic data are tagged.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::warn;

use optlab_core::domain::{Bar, FeatureSnapshot};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("column '{column}' not found in header")]
    MissingColumn { column: String },

    #[error("line {line}: unparseable timestamp '{value}'")]
    Timestamp { line: u64, value: String },

    #[error("{path} contains no data rows")]
    Empty { path: PathBuf },
}

/// Column names of a history or live CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvColumns {
    pub timestamp: String,
    pub price: String,
    pub category: Option<String>,
}

impl Default for CsvColumns {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".into(),
            price: "close".into(),
            category: None,
        }
    }
}

/// One bar and its feature snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub bar: Bar,
    pub snapshot: FeatureSnapshot,
}

impl HistoryRow {
    /// Price is usable and every feature in `required` is finite.
    pub fn is_complete<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.bar.is_sane() && self.snapshot.validate(required).is_ok()
    }
}

/// Result of loading history, with provenance.
#[derive(Debug)]
pub struct LoadedHistory {
    /// Rows in strictly increasing timestamp order.
    pub rows: Vec<HistoryRow>,
    /// Dataset hash for fingerprinting (BLAKE3 over all rows).
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Load a history CSV.
pub fn load_history(
    path: &Path,
    symbol: &str,
    columns: &CsvColumns,
) -> Result<LoadedHistory, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = normalize_order(read_rows(file, symbol, columns)?);
    if rows.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    let dataset_hash = compute_dataset_hash(&rows);
    Ok(LoadedHistory {
        rows,
        dataset_hash,
        has_synthetic: false,
    })
}

/// Parse CSV rows in file order.
///
/// Short rows are accepted (missing cells read as NaN) so a file that is
/// being appended to can be read while its last line is incomplete.
pub fn read_rows<R: Read>(
    reader: R,
    symbol: &str,
    columns: &CsvColumns,
) -> Result<Vec<HistoryRow>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| LoadError::MissingColumn {
                column: name.to_string(),
            })
    };
    let ts_idx = find(&columns.timestamp)?;
    let price_idx = find(&columns.price)?;
    let category_idx = columns.category.as_deref().map(find).transpose()?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let raw_ts = record.get(ts_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::Timestamp {
            line,
            value: raw_ts.to_string(),
        })?;

        let mut snapshot = FeatureSnapshot::new(timestamp);
        for (i, name) in headers.iter().enumerate() {
            if i == ts_idx || Some(i) == category_idx {
                continue;
            }
            snapshot.insert(name, parse_cell(record.get(i).unwrap_or("")));
        }
        if let Some(idx) = category_idx {
            snapshot.category = record
                .get(idx)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
        }

        rows.push(HistoryRow {
            bar: Bar {
                symbol: symbol.to_string(),
                timestamp,
                close: parse_cell(record.get(price_idx).unwrap_or("")),
            },
            snapshot,
        });
    }
    Ok(rows)
}

/// Sort by timestamp and keep the last row of any duplicated timestamp.
fn normalize_order(mut rows: Vec<HistoryRow>) -> Vec<HistoryRow> {
    let sorted = rows
        .windows(2)
        .all(|w| w[0].bar.timestamp < w[1].bar.timestamp);
    if sorted {
        return rows;
    }
    rows.sort_by_key(|r| r.bar.timestamp);
    let before = rows.len();
    rows.reverse();
    rows.dedup_by_key(|r| r.bar.timestamp);
    rows.reverse();
    warn!(
        dropped_duplicates = before - rows.len(),
        "history rows were out of order; sorted by timestamp"
    );
    rows
}

/// Numeric cell; blanks, NaN markers and unparseable text read as NaN.
/// Boolean text reads as 1/0.
fn parse_cell(raw: &str) -> f64 {
    match raw {
        "" => f64::NAN,
        "True" | "true" | "TRUE" => 1.0,
        "False" | "false" | "FALSE" => 0.0,
        s => s.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Accepts ISO-8601 with or without offset, with `T` or space, with or
/// without seconds, and bare dates (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.naive_local());
    }
    const FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Compute a deterministic BLAKE3 hash over all rows.
pub fn compute_dataset_hash(rows: &[HistoryRow]) -> String {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        hasher.update(row.bar.symbol.as_bytes());
        hasher.update(row.bar.timestamp.to_string().as_bytes());
        hasher.update(&row.bar.close.to_le_bytes());
        for (name, value) in &row.snapshot.values {
            hasher.update(name.as_bytes());
            hasher.update(&value.to_le_bytes());
        }
        if let Some(c) = &row.snapshot.category {
            hasher.update(c.as_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Generate synthetic one-minute history for testing/development.
///
/// The underlying is a random walk from 500.0; each named feature is drawn
/// uniformly from `[0, 1)`, so probability and 0/1 trend columns look
/// plausible. Deterministic per symbol.
pub fn synthetic_history(
    symbol: &str,
    start: NaiveDateTime,
    count: usize,
    features: &[String],
) -> LoadedHistory {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    warn!(symbol, "generating synthetic data; results will be tagged as synthetic");

    // Deterministic seed from symbol name
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut price = 500.0_f64;
    let rows: Vec<HistoryRow> = (0..count)
        .map(|i| {
            let timestamp = start + chrono::Duration::minutes(i as i64);
            price *= 1.0 + rng.gen_range(-0.001..0.001);
            let mut snapshot = FeatureSnapshot::new(timestamp);
            for name in features {
                snapshot.insert(name.as_str(), rng.gen_range(0.0..1.0));
            }
            HistoryRow {
                bar: Bar {
                    symbol: symbol.to_string(),
                    timestamp,
                    close: price,
                },
                snapshot,
            }
        })
        .collect();

    let dataset_hash = compute_dataset_hash(&rows);
    LoadedHistory {
        rows,
        dataset_hash,
        has_synthetic: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
timestamp,close,prob_h10,SAR_confirmed,strategy
2024-03-01 09:30:00,510.10,0.42,True,Scalp Reversal
2024-03-01 09:31:00,510.25,,False,
2024-03-01 09:32:00,510.40,nan,True,Trend Follow
";

    fn columns() -> CsvColumns {
        CsvColumns {
            category: Some("strategy".into()),
            ..CsvColumns::default()
        }
    }

    #[test]
    fn reads_rows_and_keeps_nan_cells() {
        let rows = read_rows(CSV.as_bytes(), "SPY", &columns()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].bar.close, 510.10);
        assert_eq!(rows[0].snapshot.get("prob_h10"), Some(0.42));
        assert_eq!(rows[0].snapshot.get("SAR_confirmed"), Some(1.0));
        assert_eq!(rows[0].snapshot.category.as_deref(), Some("Scalp Reversal"));
        assert!(rows[1].snapshot.values["prob_h10"].is_nan());
        assert_eq!(rows[1].snapshot.category, None);
        assert!(rows[2].snapshot.values["prob_h10"].is_nan());
        assert!(!rows[2].is_complete(&["prob_h10"]));
        assert!(rows[0].is_complete(&["prob_h10", "SAR_confirmed"]));
    }

    #[test]
    fn missing_price_column() {
        let cols = CsvColumns {
            price: "Close".into(),
            ..CsvColumns::default()
        };
        assert!(matches!(
            read_rows(CSV.as_bytes(), "SPY", &cols),
            Err(LoadError::MissingColumn { .. })
        ));
    }

    #[test]
    fn bad_timestamp_reports_line() {
        let csv = "timestamp,close\n2024-03-01 09:30:00,1\nyesterday,2\n";
        match read_rows(csv.as_bytes(), "SPY", &CsvColumns::default()) {
            Err(LoadError::Timestamp { line, value }) => {
                assert_eq!(line, 3);
                assert_eq!(value, "yesterday");
            }
            other => panic!("expected timestamp error, got {other:?}"),
        }
    }

    #[test]
    fn timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        for raw in [
            "2024-03-01 09:30:00",
            "2024-03-01T09:30:00",
            "2024-03-01 09:30",
            "2024-03-01 09:30:00-05:00",
            "2024-03-01T09:30:00-05:00",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "{raw}");
        }
        assert_eq!(
            parse_timestamp("2024-03-01"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("03/01/2024"), None);
    }

    #[test]
    fn out_of_order_rows_sorted_and_deduplicated() {
        let csv = "timestamp,close\n\
2024-03-01 09:32:00,3\n\
2024-03-01 09:30:00,1\n\
2024-03-01 09:31:00,2\n\
2024-03-01 09:31:00,2.5\n";
        let rows = normalize_order(read_rows(csv.as_bytes(), "SPY", &CsvColumns::default()).unwrap());
        let closes: Vec<f64> = rows.iter().map(|r| r.bar.close).collect();
        assert_eq!(closes, vec![1.0, 2.5, 3.0]);
    }

    #[test]
    fn synthetic_is_deterministic_and_tagged() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let features = vec!["prob_h10".to_string()];
        let a = synthetic_history("SPY", start, 50, &features);
        let b = synthetic_history("SPY", start, 50, &features);
        assert!(a.has_synthetic);
        assert_eq!(a.rows.len(), 50);
        assert_eq!(a.dataset_hash, b.dataset_hash);
        assert!(a.rows.iter().all(|r| r.is_complete(&features)));
        assert_ne!(
            a.dataset_hash,
            synthetic_history("QQQ", start, 50, &features).dataset_hash
        );
    }
}
