//! ClosedTrade: the immutable record of a position from entry to exit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::HorizonId;
use super::position::Direction;

/// Why a position was closed. Declaration order is evaluation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Time,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take-profit",
            ExitReason::StopLoss => "stop-loss",
            ExitReason::Time => "time",
            ExitReason::EndOfData => "end-of-data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed round trip on one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    // ── Identification ──
    pub symbol: String,
    pub horizon: HorizonId,
    pub category: String,
    pub direction: Direction,

    // ── Entry ──
    pub entry_bar: u64,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub entry_underlying: f64,
    pub entry_probability: f64,
    pub take_profit: f64,
    pub stop_loss: f64,

    // ── Exit ──
    pub exit_bar: u64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_underlying: f64,
    pub reason: ExitReason,

    // ── Duration ──
    pub bars_held: u64,
    pub partial_tp_hit: bool,

    // ── PnL ──
    pub pnl: f64,
    /// Horizon cumulative PnL immediately after this trade (stamped by the ledger).
    pub cumulative_pnl: f64,
}

impl ClosedTrade {
    /// Return on the synthetic premium paid.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (self.exit_price - self.entry_price) / self.entry_price
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
