//! Engine configuration and per-horizon mutable state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{HorizonId, HorizonSpec, Position};
use crate::policy::{CooldownBasis, CooldownState};

/// Historical replay or live polling. Decides the cooldown unit, whether
/// partial take-profit fires, and whether end-of-data closes apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Replay,
    Live,
}

/// Price at which a take-profit or stop-loss close is booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitFill {
    /// The synthetic price observed on the exit bar.
    #[default]
    Market,
    /// Exactly the take-profit or stop-loss level.
    Capped,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineConfigError {
    #[error("at least one horizon is required")]
    NoHorizons,
    #[error("duplicate horizon id {0}")]
    DuplicateHorizon(HorizonId),
    #[error("horizon {horizon}: entry threshold {threshold} must be within [0, 1]")]
    BadThreshold { horizon: HorizonId, threshold: f64 },
    #[error("horizon {horizon}: max_hold must be at least 1 bar")]
    ZeroHold { horizon: HorizonId },
    #[error("horizon {horizon}: cooldown must be in bars for replay and in seconds for live runs")]
    CooldownUnit { horizon: HorizonId },
    #[error("entry premium must be positive, got {0}")]
    BadPremium(f64),
    #[error("contract multiplier must be positive, got {0}")]
    BadMultiplier(f64),
    #[error("partial take-profit fraction must be positive, got {0}")]
    BadPartial(f64),
}

/// Configuration for one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,
    pub mode: RunMode,
    pub cooldown_basis: CooldownBasis,
    /// Normalized synthetic premium paid at every entry.
    pub entry_premium: f64,
    /// PnL = (exit - entry) * multiplier.
    pub contract_multiplier: f64,
    pub exit_fill: ExitFill,
    /// Intermediate profit fraction above entry; live runs only.
    pub partial_tp_pct: Option<f64>,
    pub horizons: Vec<HorizonSpec>,
}

impl EngineConfig {
    /// Replay defaults: exit-based cooldown, market fills, no partial TP.
    pub fn replay(symbol: impl Into<String>, horizons: Vec<HorizonSpec>) -> Self {
        Self {
            symbol: symbol.into(),
            mode: RunMode::Replay,
            cooldown_basis: CooldownBasis::Exit,
            entry_premium: 1.0,
            contract_multiplier: 100.0,
            exit_fill: ExitFill::Market,
            partial_tp_pct: None,
            horizons,
        }
    }

    /// Live defaults: entry-based cooldown, +15% partial take-profit.
    pub fn live(symbol: impl Into<String>, horizons: Vec<HorizonSpec>) -> Self {
        Self {
            mode: RunMode::Live,
            cooldown_basis: CooldownBasis::Entry,
            partial_tp_pct: Some(0.15),
            ..Self::replay(symbol, horizons)
        }
    }

    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.horizons.is_empty() {
            return Err(EngineConfigError::NoHorizons);
        }
        if !(self.entry_premium > 0.0) {
            return Err(EngineConfigError::BadPremium(self.entry_premium));
        }
        if !(self.contract_multiplier > 0.0) {
            return Err(EngineConfigError::BadMultiplier(self.contract_multiplier));
        }
        if let Some(pct) = self.partial_tp_pct {
            if !(pct > 0.0) {
                return Err(EngineConfigError::BadPartial(pct));
            }
        }
        let mut seen = Vec::with_capacity(self.horizons.len());
        for h in &self.horizons {
            if seen.contains(&h.id) {
                return Err(EngineConfigError::DuplicateHorizon(h.id));
            }
            seen.push(h.id);
            if !(0.0..=1.0).contains(&h.entry_threshold) {
                return Err(EngineConfigError::BadThreshold {
                    horizon: h.id,
                    threshold: h.entry_threshold,
                });
            }
            if h.max_hold == 0 {
                return Err(EngineConfigError::ZeroHold { horizon: h.id });
            }
            if h.cooldown.is_bars() != (self.mode == RunMode::Replay) {
                return Err(EngineConfigError::CooldownUnit { horizon: h.id });
            }
        }
        Ok(())
    }
}

/// Mutable state of one horizon. Nothing here is shared across horizons.
#[derive(Debug, Clone)]
pub struct HorizonState {
    pub spec: HorizonSpec,
    pub position: Option<Position>,
    pub cooldown: CooldownState,
    /// Index of the most recent evaluated tick, for ordering checks.
    pub last_index: Option<u64>,
}

impl HorizonState {
    pub fn new(spec: HorizonSpec) -> Self {
        Self {
            spec,
            position: None,
            cooldown: CooldownState::default(),
            last_index: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }
}
