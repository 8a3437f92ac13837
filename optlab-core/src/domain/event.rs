//! Lifecycle events emitted by the engine for notifiers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::HorizonId;
use super::position::Direction;
use super::trade::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Entry,
    PartialTp,
    Exit,
    /// A close caused by the stop-loss level.
    Stop,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Entry => "ENTRY",
            EventKind::PartialTp => "PARTIAL_TP",
            EventKind::Exit => "EXIT",
            EventKind::Stop => "STOP",
        }
    }

    pub fn is_close(self) -> bool {
        matches!(self, EventKind::Exit | EventKind::Stop)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decision taken by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub horizon: HorizonId,
    pub symbol: String,
    pub category: String,
    pub direction: Direction,
    /// Synthetic option price at the event.
    pub price: f64,
    pub underlying: f64,
    pub timestamp: NaiveDateTime,
    pub bar_index: u64,
    pub probability: Option<f64>,
    pub reason: Option<ExitReason>,
    pub pnl: Option<f64>,
}
