//! Trend confirmation: decides call vs put at entry.

use crate::domain::{FeatureSnapshot, SnapshotError};

/// External "is bullish" signal for a snapshot.
pub trait TrendConfirmation: Send + Sync {
    fn name(&self) -> &str;

    fn is_bullish(&self, snapshot: &FeatureSnapshot) -> Result<bool, SnapshotError>;
}

/// Bullish when a flag column is at or above `threshold`.
///
/// Pipelines typically write booleans as 0/1 (e.g. a parabolic-SAR
/// confirmation across correlated tickers).
#[derive(Debug, Clone)]
pub struct ColumnTrend {
    pub column: String,
    pub threshold: f64,
}

impl ColumnTrend {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            threshold: 0.5,
        }
    }
}

impl TrendConfirmation for ColumnTrend {
    fn name(&self) -> &str {
        "column"
    }

    fn is_bullish(&self, snapshot: &FeatureSnapshot) -> Result<bool, SnapshotError> {
        Ok(snapshot.require(&self.column)? >= self.threshold)
    }
}

/// Fixed answer; for runs without a trend column.
#[derive(Debug, Clone, Copy)]
pub struct FixedTrend(pub bool);

impl TrendConfirmation for FixedTrend {
    fn name(&self) -> &str {
        "fixed"
    }

    fn is_bullish(&self, _snapshot: &FeatureSnapshot) -> Result<bool, SnapshotError> {
        Ok(self.0)
    }
}
