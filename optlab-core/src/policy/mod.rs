//! Entry/exit policy: synthetic pricing, take-profit/stop-loss levels, cooldown.

pub mod cooldown;
pub mod pricing;
pub mod tp_sl;

pub use cooldown::{CooldownBasis, CooldownState, CooldownWindow};
pub use pricing::{LinearDelta, PricingError, SyntheticPricer};
pub use tp_sl::{validate_levels, PolicyViolation, TierError, TieredTpSl, TpSlPolicy, TpSlTier};
