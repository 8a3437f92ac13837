//! Position: the single open synthetic option trade owned by a horizon.

use serde::{Deserialize, Serialize};

use super::bar::Tick;
use super::ids::HorizonId;
use crate::policy::tp_sl::{validate_levels, PolicyViolation};

/// Which synthetic option the position is equivalent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Long-call equivalent: gains when the underlying rises.
    Call,
    /// Long-put equivalent: gains when the underlying falls.
    Put,
}

impl Direction {
    /// Call when the trend confirmation is bullish, put otherwise.
    pub fn from_trend(bullish: bool) -> Self {
        if bullish {
            Direction::Call
        } else {
            Direction::Put
        }
    }

    /// +1 for calls, -1 for puts.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Call => 1.0,
            Direction::Put => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Call => "CALL",
            Direction::Put => "PUT",
        }
    }
}

/// Everything needed to open a position.
#[derive(Debug, Clone)]
pub struct PositionTicket {
    pub horizon: HorizonId,
    pub category: String,
    pub entry: Tick,
    pub entry_price: f64,
    pub entry_underlying: f64,
    pub direction: Direction,
    pub take_profit: f64,
    pub stop_loss: f64,
    /// Intermediate non-closing profit level (live operation only).
    pub partial_take_profit: Option<f64>,
    pub entry_probability: f64,
}

/// An open synthetic position.
///
/// Levels are fixed at creation: fields are private and only the holding
/// count and the partial-take-profit flag change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    horizon: HorizonId,
    category: String,
    entry: Tick,
    entry_price: f64,
    entry_underlying: f64,
    direction: Direction,
    take_profit: f64,
    stop_loss: f64,
    partial_take_profit: Option<f64>,
    entry_probability: f64,
    holding: u64,
    partial_tp_hit: bool,
}

impl Position {
    /// Open a position, rejecting levels that violate `sl < entry < tp`.
    pub fn open(ticket: PositionTicket) -> Result<Self, PolicyViolation> {
        validate_levels(ticket.entry_price, ticket.take_profit, ticket.stop_loss)?;
        if let Some(partial) = ticket.partial_take_profit {
            if !(partial > ticket.entry_price && partial < ticket.take_profit) {
                return Err(PolicyViolation::PartialOutsideRange {
                    partial,
                    entry: ticket.entry_price,
                    take_profit: ticket.take_profit,
                });
            }
        }
        Ok(Self {
            horizon: ticket.horizon,
            category: ticket.category,
            entry: ticket.entry,
            entry_price: ticket.entry_price,
            entry_underlying: ticket.entry_underlying,
            direction: ticket.direction,
            take_profit: ticket.take_profit,
            stop_loss: ticket.stop_loss,
            partial_take_profit: ticket.partial_take_profit,
            entry_probability: ticket.entry_probability,
            holding: 0,
            partial_tp_hit: false,
        })
    }

    pub fn horizon(&self) -> HorizonId {
        self.horizon
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn entry(&self) -> Tick {
        self.entry
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn entry_underlying(&self) -> f64 {
        self.entry_underlying
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn partial_take_profit(&self) -> Option<f64> {
        self.partial_take_profit
    }

    pub fn entry_probability(&self) -> f64 {
        self.entry_probability
    }

    /// Bars held as of the last evaluation.
    pub fn holding(&self) -> u64 {
        self.holding
    }

    pub fn partial_tp_hit(&self) -> bool {
        self.partial_tp_hit
    }

    /// Recompute the holding count from the current tick.
    ///
    /// Derived from the entry index rather than incremented, so evaluating
    /// the same tick twice leaves it unchanged.
    pub(crate) fn observe(&mut self, now: &Tick) -> u64 {
        self.holding = now.bars_since(&self.entry);
        self.holding
    }

    /// Flag the partial take-profit. Returns false if it already fired.
    pub(crate) fn mark_partial_tp(&mut self) -> bool {
        if self.partial_tp_hit {
            return false;
        }
        self.partial_tp_hit = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ticket() -> PositionTicket {
        let time = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        PositionTicket {
            horizon: HorizonId(10),
            category: "Scalp Reversal".into(),
            entry: Tick::new(4, time),
            entry_price: 1.0,
            entry_underlying: 500.0,
            direction: Direction::Call,
            take_profit: 1.5,
            stop_loss: 0.8,
            partial_take_profit: Some(1.15),
            entry_probability: 0.8,
        }
    }

    #[test]
    fn open_valid_position() {
        let pos = Position::open(ticket()).unwrap();
        assert_eq!(pos.holding(), 0);
        assert!(!pos.partial_tp_hit());
        assert_eq!(pos.take_profit(), 1.5);
        assert_eq!(pos.stop_loss(), 0.8);
    }

    #[test]
    fn rejects_stop_at_entry() {
        let mut t = ticket();
        t.stop_loss = 1.0;
        assert!(matches!(
            Position::open(t),
            Err(PolicyViolation::StopNotBelowEntry { .. })
        ));
    }

    #[test]
    fn rejects_target_below_entry() {
        let mut t = ticket();
        t.take_profit = 0.9;
        assert!(matches!(
            Position::open(t),
            Err(PolicyViolation::TargetNotAboveEntry { .. })
        ));
    }

    #[test]
    fn rejects_partial_beyond_target() {
        let mut t = ticket();
        t.partial_take_profit = Some(1.6);
        assert!(matches!(
            Position::open(t),
            Err(PolicyViolation::PartialOutsideRange { .. })
        ));
    }

    #[test]
    fn holding_is_idempotent_per_tick() {
        let mut pos = Position::open(ticket()).unwrap();
        let now = Tick::new(7, pos.entry().time);
        assert_eq!(pos.observe(&now), 3);
        assert_eq!(pos.observe(&now), 3);
    }

    #[test]
    fn partial_tp_marks_once() {
        let mut pos = Position::open(ticket()).unwrap();
        assert!(pos.mark_partial_tp());
        assert!(!pos.mark_partial_tp());
        assert!(pos.partial_tp_hit());
    }

    #[test]
    fn direction_from_trend() {
        assert_eq!(Direction::from_trend(true), Direction::Call);
        assert_eq!(Direction::from_trend(false), Direction::Put);
        assert_eq!(Direction::Put.sign(), -1.0);
    }
}
