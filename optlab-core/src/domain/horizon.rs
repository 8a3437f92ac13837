//! Horizon: an independent position slot with its own holding limit,
//! entry threshold, cooldown window and capital bucket.

use serde::{Deserialize, Serialize};

use super::ids::HorizonId;
use crate::policy::cooldown::CooldownWindow;

/// Static description of one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonSpec {
    pub id: HorizonId,
    /// Human-readable name; used as the default trade category.
    pub label: String,
    /// Maximum holding duration in bars.
    pub max_hold: u64,
    /// Enter only when the signal probability is strictly above this.
    pub entry_threshold: f64,
    pub cooldown: CooldownWindow,
    /// Notional capital bucket; reported as `capital + cumulative_pnl`.
    pub capital: f64,
}

impl HorizonSpec {
    pub fn new(id: u32, max_hold: u64, entry_threshold: f64, cooldown: CooldownWindow) -> Self {
        Self {
            id: HorizonId(id),
            label: format!("h{id}"),
            max_hold,
            entry_threshold,
            cooldown,
            capital: 10_000.0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_capital(mut self, capital: f64) -> Self {
        self.capital = capital;
        self
    }

    /// Whether `probability` clears this horizon's entry threshold.
    pub fn accepts(&self, probability: f64) -> bool {
        probability > self.entry_threshold
    }
}
