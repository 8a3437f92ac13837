//! Aggregate queries over closed trades.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ClosedTrade, ExitReason, HorizonId};

/// Running counters for one group of trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub trades: u64,
    pub wins: u64,
    pub total_pnl: f64,
    pub bars_held: u64,
    pub exit_reasons: BTreeMap<ExitReason, u64>,
}

impl BucketStats {
    pub fn observe(&mut self, trade: &ClosedTrade) {
        self.trades += 1;
        if trade.is_winner() {
            self.wins += 1;
        }
        self.total_pnl += trade.pnl;
        self.bars_held += trade.bars_held;
        *self.exit_reasons.entry(trade.reason).or_default() += 1;
    }

    /// `count(pnl > 0) / count(*)`, 0 with no trades.
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64
    }

    pub fn avg_bars_held(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.bars_held as f64 / self.trades as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonSummary {
    pub horizon: HorizonId,
    pub trades: u64,
    pub win_rate: f64,
    pub cumulative_pnl: f64,
    pub capital: f64,
    pub ending_capital: f64,
    pub avg_bars_held: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub trades: u64,
    pub win_rate: f64,
    pub total_pnl: f64,
}

/// Read-only snapshot of the ledger's aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub trade_count: u64,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub avg_bars_held: f64,
    pub exit_reasons: BTreeMap<ExitReason, u64>,
    pub horizons: Vec<HorizonSummary>,
    pub categories: Vec<CategorySummary>,
}

impl LedgerSummary {
    pub(crate) fn from_buckets(
        total: &BucketStats,
        horizons: &BTreeMap<HorizonId, BucketStats>,
        categories: &BTreeMap<String, BucketStats>,
        capital: &BTreeMap<HorizonId, f64>,
    ) -> Self {
        Self {
            trade_count: total.trades,
            total_pnl: total.total_pnl,
            win_rate: total.win_rate(),
            avg_bars_held: total.avg_bars_held(),
            exit_reasons: total.exit_reasons.clone(),
            horizons: horizons
                .iter()
                .map(|(id, b)| {
                    let capital = capital.get(id).copied().unwrap_or(0.0);
                    HorizonSummary {
                        horizon: *id,
                        trades: b.trades,
                        win_rate: b.win_rate(),
                        cumulative_pnl: b.total_pnl,
                        capital,
                        ending_capital: capital + b.total_pnl,
                        avg_bars_held: b.avg_bars_held(),
                    }
                })
                .collect(),
            categories: categories
                .iter()
                .map(|(name, b)| CategorySummary {
                    category: name.clone(),
                    trades: b.trades,
                    win_rate: b.win_rate(),
                    total_pnl: b.total_pnl,
                })
                .collect(),
        }
    }

    /// Rebuild a summary from a stream of persisted trades.
    ///
    /// `capital` supplies per-horizon capital buckets; horizons absent from
    /// it report zero capital.
    pub fn from_trades<I>(trades: I, capital: &BTreeMap<HorizonId, f64>) -> Self
    where
        I: IntoIterator<Item = ClosedTrade>,
    {
        let mut total = BucketStats::default();
        let mut horizons: BTreeMap<HorizonId, BucketStats> =
            capital.keys().map(|id| (*id, BucketStats::default())).collect();
        let mut categories: BTreeMap<String, BucketStats> = BTreeMap::new();
        for trade in trades {
            total.observe(&trade);
            horizons.entry(trade.horizon).or_default().observe(&trade);
            categories
                .entry(trade.category.clone())
                .or_default()
                .observe(&trade);
        }
        Self::from_buckets(&total, &horizons, &categories, capital)
    }
}
