//! Historical replay driver.
//!
//! Bars are fed in strictly increasing timestamp order. For each chunk of
//! bars every horizon is scored in parallel (signals see only the snapshot),
//! then the engine applies the readings sequentially. The last bar is
//! flagged end-of-data and a final sweep closes anything still open, so a
//! finished replay never leaves a position behind.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use optlab_core::domain::{HorizonSpec, LifecycleEvent, Tick};
use optlab_core::engine::{LifecycleEngine, RunMode, SkipReason};
use optlab_core::ledger::{LedgerError, LedgerSummary, TradeSink};

use crate::config::{Components, ConfigError, RunConfig, RunId};
use crate::data_loader::{HistoryRow, LoadError, LoadedHistory};
use crate::sink::RunSink;
use crate::step::{apply_row, notify_all, score_row, RunStats};

/// Bars scored per parallel batch.
const SCORE_CHUNK: usize = 512;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to resume trade log: {0}")]
    Ledger(#[from] LedgerError),

    #[error("config mode is {actual:?}, this command needs {expected:?}")]
    Mode { expected: RunMode, actual: RunMode },
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    pub run_id: RunId,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub bar_count: usize,
    pub summary: LedgerSummary,
    pub skipped: BTreeMap<SkipReason, u64>,
    pub notifications_failed: u64,
    pub sink_failures: u64,
    pub trade_log: Option<PathBuf>,
    #[serde(skip)]
    pub events: Vec<LifecycleEvent>,
}

/// Replay `history` under `config`. Returns the result and the sink that
/// received the trades.
pub fn run_replay(
    config: &RunConfig,
    history: &LoadedHistory,
) -> Result<(ReplayResult, RunSink), RunError> {
    if config.mode != RunMode::Replay {
        return Err(RunError::Mode {
            expected: RunMode::Replay,
            actual: config.mode,
        });
    }
    let components = config.components()?;
    let required = config.required_features(components.signal.as_ref());
    let ledger = RunSink::open(config.trade_log.as_deref()).into_ledger()?;
    let mut engine = config.build_engine(ledger, required)?;

    info!(
        run_id = %config.run_id(),
        symbol = %config.symbol,
        bars = history.rows.len(),
        horizons = config.horizons.len(),
        signal = components.signal.name(),
        synthetic = history.has_synthetic,
        "replay started"
    );

    let (events, stats) = replay_rows(&mut engine, &components, &history.rows);
    let summary = engine.ledger().summary();
    let sink_failures = engine.ledger().sink_failures();

    info!(
        trades = summary.trade_count,
        total_pnl = summary.total_pnl,
        win_rate = summary.win_rate,
        skipped = stats.skipped_total(),
        "replay finished"
    );

    let sink = engine.into_ledger().into_sink();
    let result = ReplayResult {
        run_id: config.run_id(),
        dataset_hash: history.dataset_hash.clone(),
        has_synthetic: history.has_synthetic,
        bar_count: history.rows.len(),
        summary,
        skipped: stats.skipped,
        notifications_failed: stats.notifications_failed,
        sink_failures,
        trade_log: sink.path(),
        events,
    };
    Ok((result, sink))
}

/// Drive `engine` over `rows`; the last row is the end of data.
pub fn replay_rows<S: TradeSink>(
    engine: &mut LifecycleEngine<S>,
    components: &Components,
    rows: &[HistoryRow],
) -> (Vec<LifecycleEvent>, RunStats) {
    let specs: Vec<HorizonSpec> = engine.horizon_specs().cloned().collect();
    let mut stats = RunStats::default();
    let mut events = Vec::new();
    let mut last_price: Option<f64> = None;
    let last_index = rows.len().saturating_sub(1);

    for (chunk_no, chunk) in rows.chunks(SCORE_CHUNK).enumerate() {
        let scored: Vec<_> = chunk
            .par_iter()
            .map(|row| score_row(components, &specs, row))
            .collect();

        for (offset, (row, readings)) in chunk.iter().zip(scored).enumerate() {
            let index = chunk_no * SCORE_CHUNK + offset;
            let tick = Tick::new(index as u64, row.bar.timestamp);
            if row.bar.is_sane() {
                last_price = Some(row.bar.close);
            }
            events.extend(apply_row(
                engine,
                components,
                &specs,
                tick,
                row,
                readings,
                index == last_index,
                &mut stats,
            ));
        }
    }

    // The final bar may have been skipped; close survivors at the last
    // usable price.
    if let (Some(last_row), Some(price)) = (rows.last(), last_price) {
        let tick = Tick::new(last_index as u64, last_row.bar.timestamp);
        let swept = engine.finish(tick, price);
        notify_all(components, &swept, &mut stats);
        events.extend(swept);
    }
    (events, stats)
}
