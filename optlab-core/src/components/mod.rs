//! Seams to the external collaborators.
//!
//! - Signal source: probability of a favorable move per horizon
//! - Trend confirmation: bullish/bearish at entry (call vs put)
//! - Notifier: out-of-band delivery of lifecycle events
//!
//! Each seam is a trait; in-process implementations live here, networked
//! ones in the runner crate.

pub mod notifier;
pub mod signal;
pub mod trend;

pub use notifier::{deliver, format_alert, LogNotifier, Notifier, NotifyError};
pub use signal::{
    check_probability, ColumnSignal, LinearModel, LogisticHead, ModelError, Scaler,
    ScoringError, SignalSource,
};
pub use trend::{ColumnTrend, FixedTrend, TrendConfirmation};
