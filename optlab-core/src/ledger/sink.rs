//! Trade sinks: where closed trades go once the ledger has stamped them.
//!
//! `JsonlTradeLog` persists one JSON object per line, which keeps the file
//! append-only, resilient to partial writes, and streamable without holding
//! the whole history in memory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};

use super::LedgerError;
use crate::domain::ClosedTrade;

/// Destination for closed trades, in append order.
pub trait TradeSink {
    fn append(&mut self, trade: &ClosedTrade) -> Result<(), LedgerError>;
}

/// Keeps every trade in a vector. Used by replay and tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    trades: Vec<ClosedTrade>,
}

impl MemorySink {
    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClosedTrade> {
        self.trades.iter()
    }

    pub fn into_trades(self) -> Vec<ClosedTrade> {
        self.trades
    }
}

impl TradeSink for MemorySink {
    fn append(&mut self, trade: &ClosedTrade) -> Result<(), LedgerError> {
        self.trades.push(trade.clone());
        Ok(())
    }
}

/// Append-only JSONL trade log.
#[derive(Debug, Clone)]
pub struct JsonlTradeLog {
    path: PathBuf,
}

impl JsonlTradeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the log from the start. A missing file is an empty log.
    pub fn stream(&self) -> Result<TradeStream, LedgerError> {
        TradeStream::open(&self.path)
    }
}

impl TradeSink for JsonlTradeLog {
    fn append(&mut self, trade: &ClosedTrade) -> Result<(), LedgerError> {
        let json = serde_json::to_string(trade).map_err(LedgerError::Encode)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }
}

/// Lazy iterator over a JSONL trade log.
///
/// Blank lines are skipped; a malformed line is yielded as an error with its
/// 1-based line number and iteration continues.
pub struct TradeStream {
    lines: Option<Lines<BufReader<File>>>,
    line: usize,
}

impl TradeStream {
    fn open(path: &Path) -> Result<Self, LedgerError> {
        let lines = match File::open(path) {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self { lines, line: 0 })
    }
}

impl Iterator for TradeStream {
    type Item = Result<ClosedTrade, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let raw = match lines.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if raw.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&raw).map_err(|source| LedgerError::Decode {
                    line: self.line,
                    source,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::trade;

    #[test]
    fn memory_sink_keeps_order() {
        let mut sink = MemorySink::default();
        sink.append(&trade(5, "a", 1.0)).unwrap();
        sink.append(&trade(10, "b", 2.0)).unwrap();
        let pnls: Vec<f64> = sink.iter().map(|t| t.pnl).collect();
        assert_eq!(pnls, vec![1.0, 2.0]);
    }

    #[test]
    fn jsonl_roundtrip_streams_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = JsonlTradeLog::new(dir.path().join("nested").join("trades.jsonl"));
        for pnl in [10.0, -5.0, 7.5] {
            log.append(&trade(10, "x", pnl)).unwrap();
        }
        let pnls: Vec<f64> = log.stream().unwrap().map(|t| t.unwrap().pnl).collect();
        assert_eq!(pnls, vec![10.0, -5.0, 7.5]);
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlTradeLog::new(dir.path().join("none.jsonl"));
        assert_eq!(log.stream().unwrap().count(), 0);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");
        let mut log = JsonlTradeLog::new(&path);
        log.append(&trade(5, "x", 1.0)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "\n{{not json"))
            .unwrap();
        log.append(&trade(5, "x", 2.0)).unwrap();

        let items: Vec<_> = log.stream().unwrap().collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(LedgerError::Decode { line: 3, .. })));
        assert_eq!(items[2].as_ref().unwrap().pnl, 2.0);
    }
}
