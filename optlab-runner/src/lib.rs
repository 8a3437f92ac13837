//! optlab runner: configuration, data feeds, drivers, export.
//!
//! This crate builds on `optlab-core` to provide:
//! - TOML run configuration and collaborator wiring
//! - CSV history loading, a live CSV tail feed, and synthetic data
//! - Remote collaborators (HTTP scoring endpoint, chat webhook)
//! - The historical replay driver (parallel scoring) and the live driver
//! - CSV / JSON / Markdown export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod feed;
pub mod live;
pub mod remote;
pub mod replay;
pub mod sink;
mod step;

pub use config::{Components, ConfigError, RunConfig, RunId};
pub use data_loader::{
    load_history, parse_timestamp, synthetic_history, CsvColumns, HistoryRow, LoadError,
    LoadedHistory,
};
pub use feed::{CsvTailFeed, LiveFeed, ScriptedFeed};
pub use live::{run_live, run_live_from_config, LiveOptions, LiveReport};
pub use remote::{HttpSignal, RemoteError, WebhookNotifier};
pub use replay::{replay_rows, run_replay, ReplayResult, RunError};
pub use sink::RunSink;
pub use step::RunStats;
