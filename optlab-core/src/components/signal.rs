//! Signal sources: probability of a favorable move for one snapshot.
//!
//! The classifier itself is external. This module defines the seam and the
//! two in-process sources: a pre-scored column and a logistic model loaded
//! from JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{FeatureSnapshot, HorizonSpec, SnapshotError};

/// Why a probability could not be produced. Never treated as "no signal".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("snapshot not scorable: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("probability {0} is outside [0, 1]")]
    OutOfRange(f64),

    #[error("trend confirmation unavailable: {0}")]
    Trend(SnapshotError),

    #[error("model error: {0}")]
    Model(String),

    #[error("remote scorer error: {0}")]
    Remote(String),
}

/// Check that a probability is a finite value in `[0, 1]`.
pub fn check_probability(p: f64) -> Result<f64, ScoringError> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(ScoringError::OutOfRange(p))
    }
}

/// A classifier exposing `P(favorable move)` per horizon.
///
/// Implementations must be bounded (no indefinite blocking) and must not be
/// called with a snapshot that fails [`FeatureSnapshot::validate`] against
/// [`required_features`](Self::required_features).
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    fn required_features(&self) -> &[String];

    fn score(&self, snapshot: &FeatureSnapshot, horizon: &HorizonSpec) -> Result<f64, ScoringError>;
}

// ─── Pre-scored column ──────────────────────────────────────────────

/// Reads a probability the feature pipeline already wrote into the row.
///
/// The column name is a template: `{id}` expands to the horizon id and
/// `{label}` to the horizon label, e.g. `prob_h{id}`.
#[derive(Debug, Clone)]
pub struct ColumnSignal {
    template: String,
    columns: Vec<String>,
}

impl ColumnSignal {
    pub fn new(template: impl Into<String>, horizons: &[HorizonSpec]) -> Self {
        let template = template.into();
        let mut columns: Vec<String> = horizons
            .iter()
            .map(|h| Self::expand(&template, h))
            .collect();
        columns.sort();
        columns.dedup();
        Self { template, columns }
    }

    fn expand(template: &str, horizon: &HorizonSpec) -> String {
        template
            .replace("{id}", &horizon.id.0.to_string())
            .replace("{label}", &horizon.label)
    }

    pub fn column_for(&self, horizon: &HorizonSpec) -> String {
        Self::expand(&self.template, horizon)
    }
}

impl SignalSource for ColumnSignal {
    fn name(&self) -> &str {
        "column"
    }

    fn required_features(&self) -> &[String] {
        &self.columns
    }

    fn score(&self, snapshot: &FeatureSnapshot, horizon: &HorizonSpec) -> Result<f64, ScoringError> {
        let p = snapshot.require(&self.column_for(horizon))?;
        check_probability(p)
    }
}

// ─── Logistic model ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("failed to parse model: {0}")]
    Parse(String),

    #[error("{what} has {got} entries, expected {expected} (one per feature)")]
    Shape {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("scaler scale for feature '{feature}' must be non-zero")]
    ZeroScale { feature: String },

    #[error("divisor for feature '{feature}' must be non-zero")]
    ZeroDivisor { feature: String },
}

/// Standardisation applied after divisors: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        serde_json::from_str(json).map_err(|e| ModelError::Parse(e.to_string()))
    }
}

/// Intercept and one coefficient per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticHead {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LogisticHead {
    fn probability(&self, x: &[f64]) -> f64 {
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(x)
                .map(|(c, v)| c * v)
                .sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }
}

/// Logistic classifier over an ordered feature list.
///
/// `heads` holds optional per-strategy weights keyed by snapshot category or
/// horizon label; `head` is the fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub features: Vec<String>,
    /// Raw values are divided by these before scaling (e.g. `obv: 1e6`).
    #[serde(default)]
    pub divisors: BTreeMap<String, f64>,
    #[serde(default)]
    pub scaler: Option<Scaler>,
    pub head: LogisticHead,
    #[serde(default)]
    pub heads: BTreeMap<String, LogisticHead>,
}

impl LinearModel {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: LinearModel =
            serde_json::from_str(json).map_err(|e| ModelError::Parse(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Replace the scaler (e.g. one loaded from a separate file).
    pub fn with_scaler(mut self, scaler: Scaler) -> Result<Self, ModelError> {
        self.scaler = Some(scaler);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.features.len();
        let check = |what: &'static str, got: usize| {
            if got == n {
                Ok(())
            } else {
                Err(ModelError::Shape {
                    what,
                    got,
                    expected: n,
                })
            }
        };
        check("head.coefficients", self.head.coefficients.len())?;
        for head in self.heads.values() {
            check("heads[].coefficients", head.coefficients.len())?;
        }
        if let Some(scaler) = &self.scaler {
            check("scaler.mean", scaler.mean.len())?;
            check("scaler.scale", scaler.scale.len())?;
            if let Some(i) = scaler.scale.iter().position(|s| *s == 0.0) {
                return Err(ModelError::ZeroScale {
                    feature: self.features[i].clone(),
                });
            }
        }
        if let Some((feature, _)) = self.divisors.iter().find(|(_, d)| **d == 0.0) {
            return Err(ModelError::ZeroDivisor {
                feature: feature.clone(),
            });
        }
        Ok(())
    }

    fn head_for(&self, snapshot: &FeatureSnapshot, horizon: &HorizonSpec) -> &LogisticHead {
        snapshot
            .category
            .as_deref()
            .and_then(|c| self.heads.get(c))
            .or_else(|| self.heads.get(&horizon.label))
            .unwrap_or(&self.head)
    }

    fn inputs(&self, snapshot: &FeatureSnapshot) -> Result<Vec<f64>, SnapshotError> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut x = snapshot.require(name)?;
                if let Some(d) = self.divisors.get(name) {
                    x /= d;
                }
                if let Some(s) = &self.scaler {
                    x = (x - s.mean[i]) / s.scale[i];
                }
                Ok(x)
            })
            .collect()
    }
}

impl SignalSource for LinearModel {
    fn name(&self) -> &str {
        "linear"
    }

    fn required_features(&self) -> &[String] {
        &self.features
    }

    fn score(&self, snapshot: &FeatureSnapshot, horizon: &HorizonSpec) -> Result<f64, ScoringError> {
        let x = self.inputs(snapshot)?;
        check_probability(self.head_for(snapshot, horizon).probability(&x))
    }
}
