//! Run-level trade sink: in memory or an append-only JSONL file.

use std::path::{Path, PathBuf};

use optlab_core::domain::ClosedTrade;
use optlab_core::ledger::{JsonlTradeLog, LedgerError, MemorySink, TradeLedger, TradeSink};

/// The sink a configured run writes to.
#[derive(Debug, Clone)]
pub enum RunSink {
    Memory(MemorySink),
    Jsonl(JsonlTradeLog),
}

impl RunSink {
    pub fn open(trade_log: Option<&Path>) -> Self {
        match trade_log {
            Some(path) => RunSink::Jsonl(JsonlTradeLog::new(path)),
            None => RunSink::Memory(MemorySink::default()),
        }
    }

    /// Wrap the sink in a ledger. A JSONL log that already holds trades from
    /// earlier runs seeds the ledger's running totals.
    pub fn into_ledger(self) -> Result<TradeLedger<RunSink>, LedgerError> {
        let prior = match &self {
            RunSink::Jsonl(log) => Some(log.stream()?),
            RunSink::Memory(_) => None,
        };
        match prior {
            Some(stream) => TradeLedger::resume(self, stream),
            None => Ok(TradeLedger::new(self)),
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        match self {
            RunSink::Memory(_) => None,
            RunSink::Jsonl(log) => Some(log.path().to_path_buf()),
        }
    }

    /// Every trade in the sink, in append order.
    ///
    /// For a JSONL log this reads the whole file, including trades appended
    /// by earlier runs.
    pub fn trades(&self) -> Box<dyn Iterator<Item = Result<ClosedTrade, LedgerError>> + '_> {
        match self {
            RunSink::Memory(sink) => Box::new(sink.iter().cloned().map(Ok)),
            RunSink::Jsonl(log) => match log.stream() {
                Ok(stream) => Box::new(stream),
                Err(e) => Box::new(std::iter::once(Err(e))),
            },
        }
    }
}

impl TradeSink for RunSink {
    fn append(&mut self, trade: &ClosedTrade) -> Result<(), LedgerError> {
        match self {
            RunSink::Memory(sink) => sink.append(trade),
            RunSink::Jsonl(log) => log.append(trade),
        }
    }
}
