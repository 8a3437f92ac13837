//! FeatureSnapshot: one row of precomputed indicator values for one bar.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a snapshot cannot be scored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("required feature '{feature}' is missing")]
    MissingFeature { feature: String },

    #[error("required feature '{feature}' is not finite ({value})")]
    NonFinite { feature: String, value: f64 },
}

/// Named feature values keyed to exactly one bar timestamp.
///
/// Values are stored as read; NaN cells (e.g. indicator warmup) are kept so
/// that [`validate`](Self::validate) can reject the row explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub timestamp: NaiveDateTime,
    pub values: BTreeMap<String, f64>,
    /// Signal category of this row (e.g. the playbook strategy name), if the
    /// feature pipeline labels rows.
    #[serde(default)]
    pub category: Option<String>,
}

impl FeatureSnapshot {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
            category: None,
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Finite value of a feature, or `None` if absent or NaN.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().filter(|v| v.is_finite())
    }

    /// Finite value of a feature, or the reason it is unusable.
    pub fn require(&self, name: &str) -> Result<f64, SnapshotError> {
        match self.values.get(name) {
            None => Err(SnapshotError::MissingFeature {
                feature: name.to_string(),
            }),
            Some(v) if !v.is_finite() => Err(SnapshotError::NonFinite {
                feature: name.to_string(),
                value: *v,
            }),
            Some(v) => Ok(*v),
        }
    }

    /// Check that every required feature is present and finite.
    ///
    /// Reports the first offending feature in `required` order.
    pub fn validate<S: AsRef<str>>(&self, required: &[S]) -> Result<(), SnapshotError> {
        for name in required {
            self.require(name.as_ref())?;
        }
        Ok(())
    }

    /// True when the row carries no finite value at all.
    pub fn is_void(&self) -> bool {
        self.values.values().all(|v| !v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn validate_accepts_complete_row() {
        let snap = FeatureSnapshot::new(ts())
            .with("obv", 1_250_000.0)
            .with("volume", 80_000.0);
        assert!(snap.validate(&["obv", "volume"]).is_ok());
    }

    #[test]
    fn validate_reports_missing_feature() {
        let snap = FeatureSnapshot::new(ts()).with("obv", 1.0);
        let err = snap.validate(&["obv", "volume"]).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::MissingFeature {
                feature: "volume".into()
            }
        );
    }

    #[test]
    fn validate_rejects_nan() {
        let snap = FeatureSnapshot::new(ts()).with("rsi", f64::NAN);
        assert!(matches!(
            snap.validate(&["rsi"]),
            Err(SnapshotError::NonFinite { .. })
        ));
        assert_eq!(snap.get("rsi"), None);
    }

    #[test]
    fn void_row() {
        let snap = FeatureSnapshot::new(ts())
            .with("a", f64::NAN)
            .with("b", f64::INFINITY);
        assert!(snap.is_void());
        assert!(!snap.clone().with("c", 1.0).is_void());
    }
}
