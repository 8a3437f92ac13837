//! Trade ledger: append-only closed-trade record with running PnL.
//!
//! The ledger keeps only accumulators in memory; the trades themselves go to
//! a [`TradeSink`], which may be an in-memory vector or an append-only JSONL
//! file streamed back on demand.

pub mod sink;
pub mod stats;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::error;

use crate::domain::{ClosedTrade, HorizonId};

pub use sink::{JsonlTradeLog, MemorySink, TradeSink, TradeStream};
pub use stats::{BucketStats, CategorySummary, HorizonSummary, LedgerSummary};

/// Errors from the trade sink.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("trade log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trade log line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode trade: {0}")]
    Encode(serde_json::Error),
}

/// Running totals plus the sink that receives every closed trade.
pub struct TradeLedger<S: TradeSink = MemorySink> {
    sink: S,
    capital: BTreeMap<HorizonId, f64>,
    horizons: BTreeMap<HorizonId, BucketStats>,
    categories: BTreeMap<String, BucketStats>,
    total: BucketStats,
    sink_failures: u64,
}

impl TradeLedger<MemorySink> {
    pub fn in_memory() -> Self {
        Self::new(MemorySink::default())
    }
}

impl<S: TradeSink> TradeLedger<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            capital: BTreeMap::new(),
            horizons: BTreeMap::new(),
            categories: BTreeMap::new(),
            total: BucketStats::default(),
            sink_failures: 0,
        }
    }

    /// Continue a ledger whose sink already holds `prior` trades.
    ///
    /// The accumulators are seeded from `prior` so cumulative PnL keeps
    /// running across restarts instead of starting again at zero. The prior
    /// trades are not re-appended to the sink.
    pub fn resume<I>(sink: S, prior: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = Result<ClosedTrade, LedgerError>>,
    {
        let mut ledger = Self::new(sink);
        for trade in prior {
            let trade = trade?;
            ledger.horizons.entry(trade.horizon).or_default().observe(&trade);
            ledger
                .categories
                .entry(trade.category.clone())
                .or_default()
                .observe(&trade);
            ledger.total.observe(&trade);
        }
        Ok(ledger)
    }

    /// Register a horizon so it appears in breakdowns even with zero trades.
    pub fn register(&mut self, horizon: HorizonId, capital: f64) {
        self.capital.insert(horizon, capital);
        self.horizons.entry(horizon).or_default();
    }

    /// Append a trade, stamping its horizon's cumulative PnL.
    ///
    /// Accumulators are updated before the sink write; a sink failure is
    /// logged and counted but does not roll the trade back.
    pub fn append(&mut self, mut trade: ClosedTrade) -> ClosedTrade {
        let bucket = self.horizons.entry(trade.horizon).or_default();
        bucket.observe(&trade);
        trade.cumulative_pnl = bucket.total_pnl;

        self.categories
            .entry(trade.category.clone())
            .or_default()
            .observe(&trade);
        self.total.observe(&trade);

        if let Err(e) = self.sink.append(&trade) {
            self.sink_failures += 1;
            error!(horizon = %trade.horizon, error = %e, "failed to persist closed trade");
        }
        trade
    }

    /// Cumulative PnL of one horizon (0 if it never traded).
    pub fn cumulative_pnl(&self, horizon: HorizonId) -> f64 {
        self.horizons.get(&horizon).map_or(0.0, |b| b.total_pnl)
    }

    pub fn total_pnl(&self) -> f64 {
        self.total.total_pnl
    }

    pub fn trade_count(&self) -> u64 {
        self.total.trades
    }

    pub fn win_rate(&self) -> f64 {
        self.total.win_rate()
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Read-only aggregate view computed from the accumulators.
    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary::from_buckets(&self.total, &self.horizons, &self.categories, &self.capital)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, ExitReason};
    use chrono::NaiveDate;

    pub(crate) fn trade(horizon: u32, category: &str, pnl: f64) -> ClosedTrade {
        let t0 = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        ClosedTrade {
            symbol: "SPY".into(),
            horizon: HorizonId(horizon),
            category: category.into(),
            direction: Direction::Call,
            entry_bar: 0,
            entry_time: t0,
            entry_price: 1.0,
            entry_underlying: 500.0,
            entry_probability: 0.7,
            take_profit: 1.3,
            stop_loss: 0.85,
            exit_bar: 3,
            exit_time: t0,
            exit_price: 1.0 + pnl / 100.0,
            exit_underlying: 500.0,
            reason: if pnl > 0.0 {
                ExitReason::TakeProfit
            } else {
                ExitReason::StopLoss
            },
            bars_held: 3,
            partial_tp_hit: false,
            pnl,
            cumulative_pnl: 0.0,
        }
    }

    #[test]
    fn stamps_per_horizon_cumulative() {
        let mut ledger = TradeLedger::in_memory();
        let a = ledger.append(trade(5, "scalp", 30.0));
        let b = ledger.append(trade(10, "trend", -15.0));
        let c = ledger.append(trade(5, "scalp", -10.0));
        assert_eq!(a.cumulative_pnl, 30.0);
        assert_eq!(b.cumulative_pnl, -15.0);
        assert_eq!(c.cumulative_pnl, 20.0);
        assert_eq!(ledger.total_pnl(), 5.0);
        assert_eq!(ledger.sink().trades().len(), 3);
    }

    #[test]
    fn win_rate_counts_strictly_positive() {
        let mut ledger = TradeLedger::in_memory();
        ledger.append(trade(5, "a", 10.0));
        ledger.append(trade(5, "a", 0.0));
        ledger.append(trade(5, "a", -5.0));
        ledger.append(trade(5, "a", 20.0));
        assert!((ledger.win_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn resume_continues_cumulative_pnl() {
        let prior = vec![Ok(trade(5, "scalp", 30.0)), Ok(trade(10, "trend", -15.0))];
        let mut ledger = TradeLedger::resume(MemorySink::default(), prior).unwrap();
        assert_eq!(ledger.cumulative_pnl(HorizonId(5)), 30.0);
        assert_eq!(ledger.trade_count(), 2);

        let next = ledger.append(trade(5, "scalp", 10.0));
        assert_eq!(next.cumulative_pnl, 40.0);
        assert_eq!(ledger.total_pnl(), 25.0);
        // Prior trades stay where they were; only the new one is written.
        assert_eq!(ledger.sink().trades().len(), 1);
    }

    #[test]
    fn resume_stops_at_unreadable_trade() {
        let prior = vec![
            Ok(trade(5, "scalp", 30.0)),
            Err(LedgerError::Io(std::io::Error::other("disk gone"))),
        ];
        assert!(TradeLedger::resume(MemorySink::default(), prior).is_err());
    }

    #[test]
    fn empty_ledger() {
        let mut ledger = TradeLedger::in_memory();
        ledger.register(HorizonId(10), 5_000.0);
        assert_eq!(ledger.trade_count(), 0);
        assert_eq!(ledger.win_rate(), 0.0);
        let summary = ledger.summary();
        assert_eq!(summary.horizons.len(), 1);
        assert_eq!(summary.horizons[0].ending_capital, 5_000.0);
    }
}
