//! Live feeds: where each live tick gets its latest snapshot.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::data_loader::{read_rows, CsvColumns, HistoryRow, LoadError};

/// Source of the most recent bar for live polling.
pub trait LiveFeed: Send {
    fn name(&self) -> &str;

    /// Latest complete row, `None` if nothing usable is available yet.
    fn latest(&mut self) -> Result<Option<HistoryRow>, LoadError>;
}

/// Tails a CSV that an external feature pipeline keeps appending to.
///
/// Every poll re-reads the file and returns the last row whose price and
/// required features are all present, so warmup rows and a half-written
/// final line are passed over.
#[derive(Debug, Clone)]
pub struct CsvTailFeed {
    path: PathBuf,
    symbol: String,
    columns: CsvColumns,
    required: Vec<String>,
}

impl CsvTailFeed {
    pub fn new(
        path: impl Into<PathBuf>,
        symbol: impl Into<String>,
        columns: CsvColumns,
        required: Vec<String>,
    ) -> Self {
        Self {
            path: path.into(),
            symbol: symbol.into(),
            columns,
            required,
        }
    }
}

impl LiveFeed for CsvTailFeed {
    fn name(&self) -> &str {
        "csv_tail"
    }

    fn latest(&mut self) -> Result<Option<HistoryRow>, LoadError> {
        let file = std::fs::File::open(&self.path).map_err(|source| LoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        let rows = read_rows(file, &self.symbol, &self.columns)?;
        Ok(rows
            .into_iter()
            .rev()
            .find(|r| r.is_complete(&self.required)))
    }
}

/// Replays a fixed queue of rows, one per poll; repeats the last row once
/// the queue is drained. For dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeed {
    rows: VecDeque<HistoryRow>,
    last: Option<HistoryRow>,
}

impl ScriptedFeed {
    pub fn new(rows: impl IntoIterator<Item = HistoryRow>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            last: None,
        }
    }
}

impl LiveFeed for ScriptedFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    fn latest(&mut self) -> Result<Option<HistoryRow>, LoadError> {
        if let Some(row) = self.rows.pop_front() {
            self.last = Some(row);
        }
        Ok(self.last.clone())
    }
}
