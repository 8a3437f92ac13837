//! Per-bar plumbing shared by the replay and live drivers.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use optlab_core::components::{deliver, ScoringError};
use optlab_core::domain::{HorizonSpec, LifecycleEvent, Tick};
use optlab_core::engine::{BarInput, LifecycleEngine, SignalReading, SkipReason};
use optlab_core::ledger::TradeSink;

use crate::config::Components;
use crate::data_loader::HistoryRow;

/// Counters collected while driving the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub bars: u64,
    pub evaluations: u64,
    pub skipped: BTreeMap<SkipReason, u64>,
    pub notifications_failed: u64,
}

impl RunStats {
    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_default() += 1;
    }
}

/// Score every horizon on one snapshot. Signal calls are independent, so
/// they run in parallel.
pub(crate) fn score_row(
    components: &Components,
    specs: &[HorizonSpec],
    row: &HistoryRow,
) -> Vec<Result<SignalReading, ScoringError>> {
    let signal = components.signal.as_ref();
    let trend = components.trend.as_ref();
    specs
        .par_iter()
        .map(|spec| SignalReading::read(signal, trend, &row.snapshot, spec))
        .collect()
}

/// Apply one bar's readings to the engine, horizon by horizon, notifying
/// every resulting event.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_row<S: TradeSink>(
    engine: &mut LifecycleEngine<S>,
    components: &Components,
    specs: &[HorizonSpec],
    tick: Tick,
    row: &HistoryRow,
    readings: Vec<Result<SignalReading, ScoringError>>,
    end_of_data: bool,
    stats: &mut RunStats,
) -> Vec<LifecycleEvent> {
    let bar = BarInput {
        tick,
        underlying: row.bar.close,
        snapshot: &row.snapshot,
        end_of_data,
    };
    stats.bars += 1;

    let mut events = Vec::new();
    for (spec, reading) in specs.iter().zip(readings) {
        stats.evaluations += 1;
        match engine.evaluate(spec.id, &bar, reading) {
            Ok(Some(event)) => {
                if !deliver(components.notifier.as_ref(), &event) {
                    stats.notifications_failed += 1;
                }
                events.push(event);
            }
            Ok(None) => {}
            Err(e) => {
                let reason = e.skip_reason();
                debug!(horizon = %spec.id, bar = tick.index, ?reason, error = %e, "evaluation skipped");
                stats.skip(reason);
            }
        }
    }
    events
}

/// Notify the closes produced by an end-of-run sweep.
pub(crate) fn notify_all(components: &Components, events: &[LifecycleEvent], stats: &mut RunStats) {
    for event in events {
        if !deliver(components.notifier.as_ref(), event) {
            stats.notifications_failed += 1;
        }
    }
}
