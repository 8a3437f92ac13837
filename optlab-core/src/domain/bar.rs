//! Bar and Tick: the unit of market time the engine advances on.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One price bar for the underlying instrument.
///
/// Only the close is needed by the lifecycle engine; the feature pipeline
/// carries everything else in the matching [`FeatureSnapshot`](super::FeatureSnapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub close: f64,
}

impl Bar {
    /// Returns true if the close is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !self.close.is_finite()
    }

    /// A usable underlying price: finite and strictly positive.
    pub fn is_sane(&self) -> bool {
        !self.is_void() && self.close > 0.0
    }
}

/// Position of an evaluation in the run's sequence of bars.
///
/// `index` counts bars (historical replay) or distinct observed bars (live);
/// `time` is the bar's timestamp. Cooldown windows measured in bars compare
/// indices, windows measured in seconds compare times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub index: u64,
    pub time: NaiveDateTime,
}

impl Tick {
    pub fn new(index: u64, time: NaiveDateTime) -> Self {
        Self { index, time }
    }

    /// Bars elapsed since `earlier` (zero if `earlier` is not actually earlier).
    pub fn bars_since(&self, earlier: &Tick) -> u64 {
        self.index.saturating_sub(earlier.index)
    }

    /// Wall-clock seconds elapsed since `earlier`.
    pub fn seconds_since(&self, earlier: &Tick) -> i64 {
        (self.time - earlier.time).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn bar_is_sane() {
        let bar = Bar {
            symbol: "SPY".into(),
            timestamp: ts(9, 30),
            close: 512.3,
        };
        assert!(bar.is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let bar = Bar {
            symbol: "SPY".into(),
            timestamp: ts(9, 30),
            close: f64::NAN,
        };
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn non_positive_close_is_not_sane() {
        let bar = Bar {
            symbol: "SPY".into(),
            timestamp: ts(9, 30),
            close: 0.0,
        };
        assert!(!bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn tick_elapsed() {
        let a = Tick::new(3, ts(9, 30));
        let b = Tick::new(7, ts(9, 45));
        assert_eq!(b.bars_since(&a), 4);
        assert_eq!(b.seconds_since(&a), 15 * 60);
        assert_eq!(a.bars_since(&b), 0);
    }
}
