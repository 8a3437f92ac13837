//! Lifecycle engine: the stateful core.
//!
//! The engine is handed one bar at a time per horizon, together with the
//! signal reading scored for that horizon, and decides whether to open,
//! hold, or close the horizon's position. Closed positions go to the
//! ledger; every decision is returned as a [`LifecycleEvent`](crate::domain::LifecycleEvent)
//! for notifiers.

pub mod lifecycle;
pub mod state;

pub use lifecycle::{BarInput, EvaluateError, LifecycleEngine, SignalReading, SkipReason};
pub use state::{EngineConfig, EngineConfigError, ExitFill, HorizonState, RunMode};
