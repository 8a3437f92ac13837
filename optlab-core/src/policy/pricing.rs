//! Synthetic option pricing.
//!
//! The synthetic premium moves linearly with the underlying, scaled by a
//! fixed delta and signed by direction. There is no time decay and no
//! volatility term; the pricer is a trait so a real model can replace it.

use thiserror::Error;

use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    #[error("delta must be positive and finite, got {0}")]
    BadDelta(f64),
}

/// Pure mapping from an underlying move to a synthetic option price.
pub trait SyntheticPricer: Send + Sync {
    fn name(&self) -> &str;

    /// Synthetic price now, given the position's entry premium and the
    /// underlying price at entry and now.
    fn price(
        &self,
        direction: Direction,
        entry_premium: f64,
        entry_underlying: f64,
        underlying: f64,
    ) -> f64;
}

/// `premium + sign * delta * (underlying - entry_underlying)`, floored at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDelta {
    delta: f64,
}

impl LinearDelta {
    /// A zero, negative or NaN delta would freeze or invert the price.
    pub fn new(delta: f64) -> Result<Self, PricingError> {
        if !(delta > 0.0 && delta.is_finite()) {
            return Err(PricingError::BadDelta(delta));
        }
        Ok(Self { delta })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }
}

impl Default for LinearDelta {
    fn default() -> Self {
        Self { delta: 0.5 }
    }
}

impl SyntheticPricer for LinearDelta {
    fn name(&self) -> &str {
        "linear_delta"
    }

    fn price(
        &self,
        direction: Direction,
        entry_premium: f64,
        entry_underlying: f64,
        underlying: f64,
    ) -> f64 {
        let move_ = underlying - entry_underlying;
        (entry_premium + direction.sign() * self.delta * move_).max(0.0)
    }
}
