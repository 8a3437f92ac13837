//! Take-profit / stop-loss levels as a function of entry price and confidence.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Levels that cannot open a position. Fatal to that entry only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyViolation {
    #[error("stop-loss {stop_loss} is not below entry price {entry}")]
    StopNotBelowEntry { stop_loss: f64, entry: f64 },

    #[error("take-profit {take_profit} is not above entry price {entry}")]
    TargetNotAboveEntry { take_profit: f64, entry: f64 },

    #[error("partial take-profit {partial} is not between entry {entry} and take-profit {take_profit}")]
    PartialOutsideRange {
        partial: f64,
        entry: f64,
        take_profit: f64,
    },
}

/// Enforce `sl < entry < tp`. NaN levels fail both comparisons.
pub fn validate_levels(entry: f64, take_profit: f64, stop_loss: f64) -> Result<(), PolicyViolation> {
    if !(stop_loss < entry) {
        return Err(PolicyViolation::StopNotBelowEntry { stop_loss, entry });
    }
    if !(entry < take_profit) {
        return Err(PolicyViolation::TargetNotAboveEntry { take_profit, entry });
    }
    Ok(())
}

/// Pluggable `dynamic_tp_sl(entry_price, probability) -> (tp, sl)`.
///
/// Contract: `sl < entry_price < tp`, with the profit target widening as
/// probability rises. The engine validates the contract on every entry and
/// rejects the entry when it is broken.
pub trait TpSlPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `(take_profit, stop_loss)`.
    fn levels(&self, entry_price: f64, probability: f64) -> (f64, f64);
}

/// One confidence band: applies when `probability >= min_probability`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpSlTier {
    pub min_probability: f64,
    /// Take-profit as a fraction above entry (0.5 → +50%).
    pub tp_pct: f64,
    /// Stop-loss as a fraction below entry (0.2 → -20%).
    pub sl_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TierError {
    #[error("at least one tier is required")]
    Empty,
    #[error("tier {index}: tp_pct must be > 0 and sl_pct in (0, 1), got tp={tp_pct} sl={sl_pct}")]
    BadBand { index: usize, tp_pct: f64, sl_pct: f64 },
    #[error("tiers are not monotonic: higher confidence must not narrow the profit target or tighten the stop")]
    NotMonotonic,
}

/// Step-function policy over probability bands.
///
/// Probabilities below the lowest band fall into the lowest band.
/// Serialized as the list of bands; deserializing runs the same checks as
/// [`TieredTpSl::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TpSlTier>", into = "Vec<TpSlTier>")]
pub struct TieredTpSl {
    tiers: Vec<TpSlTier>,
}

impl TieredTpSl {
    /// Build from bands in any order; they are sorted by `min_probability`.
    pub fn new(mut tiers: Vec<TpSlTier>) -> Result<Self, TierError> {
        if tiers.is_empty() {
            return Err(TierError::Empty);
        }
        for (index, t) in tiers.iter().enumerate() {
            if !(t.tp_pct > 0.0) || !(t.sl_pct > 0.0 && t.sl_pct < 1.0) {
                return Err(TierError::BadBand {
                    index,
                    tp_pct: t.tp_pct,
                    sl_pct: t.sl_pct,
                });
            }
        }
        tiers.sort_by(|a, b| a.min_probability.total_cmp(&b.min_probability));
        let monotonic = tiers
            .windows(2)
            .all(|w| w[1].tp_pct >= w[0].tp_pct && w[1].sl_pct >= w[0].sl_pct);
        if !monotonic {
            return Err(TierError::NotMonotonic);
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[TpSlTier] {
        &self.tiers
    }

    fn tier_for(&self, probability: f64) -> &TpSlTier {
        self.tiers
            .iter()
            .rev()
            .find(|t| probability >= t.min_probability)
            .unwrap_or(&self.tiers[0])
    }
}

impl TryFrom<Vec<TpSlTier>> for TieredTpSl {
    type Error = TierError;

    fn try_from(tiers: Vec<TpSlTier>) -> Result<Self, Self::Error> {
        Self::new(tiers)
    }
}

impl From<TieredTpSl> for Vec<TpSlTier> {
    fn from(policy: TieredTpSl) -> Self {
        policy.tiers
    }
}

impl Default for TieredTpSl {
    fn default() -> Self {
        Self {
            tiers: vec![
                TpSlTier {
                    min_probability: 0.0,
                    tp_pct: 0.20,
                    sl_pct: 0.10,
                },
                TpSlTier {
                    min_probability: 0.65,
                    tp_pct: 0.30,
                    sl_pct: 0.15,
                },
                TpSlTier {
                    min_probability: 0.80,
                    tp_pct: 0.50,
                    sl_pct: 0.20,
                },
            ],
        }
    }
}

impl TpSlPolicy for TieredTpSl {
    fn name(&self) -> &str {
        "tiered"
    }

    fn levels(&self, entry_price: f64, probability: f64) -> (f64, f64) {
        let tier = self.tier_for(probability);
        (
            entry_price * (1.0 + tier.tp_pct),
            entry_price * (1.0 - tier.sl_pct),
        )
    }
}
