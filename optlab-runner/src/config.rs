//! Serializable run configuration, loaded from TOML.
//!
//! One file describes a whole run: mode, horizons, pricing and exit policy,
//! the signal/trend/notifier collaborators and where the data lives. The
//! builders here turn it into a ready [`LifecycleEngine`] plus [`Components`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use optlab_core::components::{
    ColumnSignal, ColumnTrend, FixedTrend, LinearModel, LogNotifier, ModelError, Notifier, Scaler,
    SignalSource, TrendConfirmation,
};
use optlab_core::domain::{HorizonId, HorizonSpec};
use optlab_core::engine::{EngineConfig, EngineConfigError, ExitFill, LifecycleEngine, RunMode};
use optlab_core::ledger::{TradeLedger, TradeSink};
use optlab_core::policy::{
    CooldownBasis, CooldownWindow, LinearDelta, PricingError, TierError, TieredTpSl, TpSlTier,
};

use crate::data_loader::CsvColumns;
use crate::remote::{HttpSignal, RemoteError, WebhookNotifier};

/// Unique identifier for a run (content-addressable hash of its config).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("horizon {horizon}: set exactly one of cooldown_bars / cooldown_secs")]
    CooldownAmbiguous { horizon: HorizonId },

    #[error("horizon {horizon}: {mode:?} runs measure cooldown in {expected}")]
    CooldownUnit {
        horizon: HorizonId,
        mode: RunMode,
        expected: &'static str,
    },

    #[error(transparent)]
    Engine(#[from] EngineConfigError),

    #[error("pricing: {0}")]
    Pricing(#[from] PricingError),

    #[error("tp/sl tiers: {0}")]
    Tiers(#[from] TierError),

    #[error("model file {path}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    #[error("{0} is required for this run but not configured")]
    Missing(&'static str),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Serializable configuration for a replay or live run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub mode: RunMode,

    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Which transition moves the cooldown marker. Defaults per mode:
    /// exit for replay, entry for live.
    #[serde(default)]
    pub cooldown_basis: Option<CooldownBasis>,

    pub horizons: Vec<HorizonConfig>,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub exits: ExitsConfig,

    #[serde(default)]
    pub tp_sl: TpSlConfig,

    pub signal: SignalConfig,

    /// Absent: every entry is a call.
    #[serde(default)]
    pub trend: Option<TrendConfig>,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub data: DataConfig,

    /// Append-only JSONL trade log. Absent: trades are kept in memory.
    #[serde(default)]
    pub trade_log: Option<PathBuf>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorizonConfig {
    pub id: u32,
    #[serde(default)]
    pub label: Option<String>,
    pub max_hold: u64,
    pub entry_threshold: f64,
    #[serde(default = "default_capital")]
    pub capital: f64,
    #[serde(default)]
    pub cooldown_bars: Option<u64>,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    pub entry_premium: f64,
    pub delta: f64,
    pub contract_multiplier: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            entry_premium: 1.0,
            delta: 0.5,
            contract_multiplier: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExitsConfig {
    pub fill: ExitFill,
    /// Live only. Absent: +15%. Zero disables the partial take-profit.
    pub partial_tp_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TpSlConfig {
    /// Empty: the built-in 80/65 confidence bands.
    pub tiers: Vec<TpSlTier>,
}

/// Where per-horizon probabilities come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalConfig {
    /// Pre-scored probability columns, e.g. `prob_h{id}`.
    Column {
        #[serde(default = "default_column_template")]
        template: String,
    },
    /// Logistic model from JSON, optional separate scaler file.
    Linear {
        model_path: PathBuf,
        #[serde(default)]
        scaler_path: Option<PathBuf>,
    },
    /// Remote scoring endpoint.
    Http {
        url: String,
        features: Vec<String>,
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendConfig {
    pub column: String,
    #[serde(default = "default_trend_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    #[default]
    Log,
    Webhook {
        url: String,
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub history_path: Option<PathBuf>,
    pub live_path: Option<PathBuf>,
    pub timestamp_column: String,
    pub price_column: String,
    pub category_column: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            history_path: None,
            live_path: None,
            timestamp_column: "timestamp".into(),
            price_column: "close".into(),
            category_column: None,
        }
    }
}

fn default_symbol() -> String {
    "SPY".into()
}

fn default_capital() -> f64 {
    10_000.0
}

fn default_poll_interval() -> u64 {
    60
}

fn default_column_template() -> String {
    "prob_h{id}".into()
}

fn default_timeout() -> u64 {
    5
}

fn default_trend_threshold() -> f64 {
    0.5
}

/// The external collaborators of one run.
pub struct Components {
    pub signal: Box<dyn SignalSource>,
    pub trend: Box<dyn TrendConfirmation>,
    pub notifier: Box<dyn Notifier>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate. Unit mismatches and bad tiers fail here, before
    /// any data is touched.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.engine_config()?.validate()?;
        config.tp_sl_policy()?;
        config.pricer()?;
        Ok(config)
    }

    /// Computes a deterministic hash ID for this configuration.
    pub fn run_id(&self) -> RunId {
        let bytes = serde_json::to_vec(self).unwrap_or_else(|_| format!("{self:?}").into_bytes());
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub fn horizon_specs(&self) -> Result<Vec<HorizonSpec>, ConfigError> {
        self.horizons
            .iter()
            .map(|h| {
                let horizon = HorizonId(h.id);
                let cooldown = match (h.cooldown_bars, h.cooldown_secs) {
                    (Some(bars), None) => CooldownWindow::Bars(bars),
                    (None, Some(secs)) => CooldownWindow::Seconds(secs),
                    _ => return Err(ConfigError::CooldownAmbiguous { horizon }),
                };
                if cooldown.is_bars() != (self.mode == RunMode::Replay) {
                    return Err(ConfigError::CooldownUnit {
                        horizon,
                        mode: self.mode,
                        expected: match self.mode {
                            RunMode::Replay => "bars (cooldown_bars)",
                            RunMode::Live => "seconds (cooldown_secs)",
                        },
                    });
                }
                let mut spec = HorizonSpec::new(h.id, h.max_hold, h.entry_threshold, cooldown)
                    .with_capital(h.capital);
                if let Some(label) = &h.label {
                    spec = spec.with_label(label.clone());
                }
                Ok(spec)
            })
            .collect()
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let horizons = self.horizon_specs()?;
        let mut config = match self.mode {
            RunMode::Replay => EngineConfig::replay(self.symbol.clone(), horizons),
            RunMode::Live => EngineConfig::live(self.symbol.clone(), horizons),
        };
        if let Some(basis) = self.cooldown_basis {
            config.cooldown_basis = basis;
        }
        config.entry_premium = self.pricing.entry_premium;
        config.contract_multiplier = self.pricing.contract_multiplier;
        config.exit_fill = self.exits.fill;
        if self.mode == RunMode::Live {
            match self.exits.partial_tp_pct {
                Some(pct) if pct == 0.0 => config.partial_tp_pct = None,
                Some(pct) => config.partial_tp_pct = Some(pct),
                None => {}
            }
        }
        Ok(config)
    }

    pub fn tp_sl_policy(&self) -> Result<TieredTpSl, ConfigError> {
        if self.tp_sl.tiers.is_empty() {
            return Ok(TieredTpSl::default());
        }
        Ok(TieredTpSl::new(self.tp_sl.tiers.clone())?)
    }

    pub fn pricer(&self) -> Result<LinearDelta, ConfigError> {
        Ok(LinearDelta::new(self.pricing.delta)?)
    }

    pub fn csv_columns(&self) -> CsvColumns {
        CsvColumns {
            timestamp: self.data.timestamp_column.clone(),
            price: self.data.price_column.clone(),
            category: self.data.category_column.clone(),
        }
    }

    /// Build the engine around `ledger`, with this run's pricer, TP/SL
    /// policy and required features.
    pub fn build_engine<S: TradeSink>(
        &self,
        ledger: TradeLedger<S>,
        required_features: Vec<String>,
    ) -> Result<LifecycleEngine<S>, ConfigError> {
        Ok(LifecycleEngine::new(self.engine_config()?, ledger)?
            .with_pricer(self.pricer()?)
            .with_tp_sl(self.tp_sl_policy()?)
            .with_required_features(required_features))
    }

    /// Build the signal source. A missing model or scaler file is an error.
    pub fn build_signal(&self) -> Result<Box<dyn SignalSource>, ConfigError> {
        Ok(match &self.signal {
            SignalConfig::Column { template } => {
                Box::new(ColumnSignal::new(template.clone(), &self.horizon_specs()?))
            }
            SignalConfig::Linear {
                model_path,
                scaler_path,
            } => {
                let mut model = LinearModel::from_json(&read_file(model_path)?).map_err(|source| {
                    ConfigError::Model {
                        path: model_path.clone(),
                        source,
                    }
                })?;
                if let Some(path) = scaler_path {
                    let model_error = |source| ConfigError::Model {
                        path: path.clone(),
                        source,
                    };
                    let scaler = Scaler::from_json(&read_file(path)?).map_err(model_error)?;
                    model = model.with_scaler(scaler).map_err(model_error)?;
                }
                Box::new(model)
            }
            SignalConfig::Http {
                url,
                features,
                timeout_secs,
            } => Box::new(HttpSignal::new(
                url.clone(),
                features.clone(),
                Duration::from_secs(*timeout_secs),
            )?),
        })
    }

    pub fn build_trend(&self) -> Box<dyn TrendConfirmation> {
        match &self.trend {
            Some(t) => Box::new(ColumnTrend {
                column: t.column.clone(),
                threshold: t.threshold,
            }),
            None => Box::new(FixedTrend(true)),
        }
    }

    pub fn build_notifier(&self) -> Result<Box<dyn Notifier>, ConfigError> {
        Ok(match &self.notifier {
            NotifierConfig::Log => Box::new(LogNotifier),
            NotifierConfig::Webhook { url, timeout_secs } => Box::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_secs(*timeout_secs),
            )?),
        })
    }

    pub fn components(&self) -> Result<Components, ConfigError> {
        Ok(Components {
            signal: self.build_signal()?,
            trend: self.build_trend(),
            notifier: self.build_notifier()?,
        })
    }

    /// Every column a snapshot must carry: the signal's inputs plus the
    /// trend column.
    pub fn required_features(&self, signal: &dyn SignalSource) -> Vec<String> {
        let mut features = signal.required_features().to_vec();
        if let Some(t) = &self.trend {
            if !features.contains(&t.column) {
                features.push(t.column.clone());
            }
        }
        features
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
