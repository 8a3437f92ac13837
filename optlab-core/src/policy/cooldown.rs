//! Cooldown policy: refuse new entries while `now - marker < window`.
//!
//! The marker is the tick of the most recent entry or exit, depending on the
//! configured [`CooldownBasis`]. The window is measured in bars for
//! historical replay and in seconds for live operation; a run uses one unit.

use serde::{Deserialize, Serialize};

use crate::domain::Tick;

/// Which lifecycle transition moves the cooldown marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownBasis {
    Entry,
    Exit,
}

/// Minimum distance between the marker and a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownWindow {
    Bars(u64),
    Seconds(u64),
}

impl CooldownWindow {
    /// True while `now` is still inside the window opened at `marker`.
    pub fn blocks(&self, marker: &Tick, now: &Tick) -> bool {
        match *self {
            CooldownWindow::Bars(n) => now.bars_since(marker) < n,
            CooldownWindow::Seconds(s) => now.seconds_since(marker) < s as i64,
        }
    }

    pub fn is_bars(&self) -> bool {
        matches!(self, CooldownWindow::Bars(_))
    }
}

/// Per-horizon cooldown marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CooldownState {
    marker: Option<Tick>,
}

impl CooldownState {
    pub fn marker(&self) -> Option<Tick> {
        self.marker
    }

    pub fn mark(&mut self, tick: Tick) {
        self.marker = Some(tick);
    }

    /// Whether a new entry at `now` is refused.
    pub fn is_blocking(&self, window: &CooldownWindow, now: &Tick) -> bool {
        self.marker
            .as_ref()
            .map_or(false, |marker| window.blocks(marker, now))
    }
}
