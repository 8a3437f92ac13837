//! Live polling driver.
//!
//! Each tick asks the feed for its latest complete row, scores every
//! horizon, and applies the readings. A row whose timestamp equals the
//! previous tick's re-uses the previous bar index, so polling faster than
//! the feed updates re-evaluates the same bar idempotently. Any failure
//! skips the tick; the loop keeps running.
//!
//! Positions still open at shutdown are not persisted. Closed trades are
//! appended whole, one line each, so the trade log is always consistent.

use std::thread;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use optlab_core::components::ScoringError;
use optlab_core::domain::{HorizonSpec, Tick};
use optlab_core::engine::{LifecycleEngine, RunMode, SignalReading, SkipReason};
use optlab_core::ledger::{LedgerSummary, TradeSink};

use crate::config::{Components, RunConfig};
use crate::data_loader::HistoryRow;
use crate::feed::{CsvTailFeed, LiveFeed};
use crate::replay::RunError;
use crate::sink::RunSink;
use crate::step::{apply_row, score_row, RunStats};

#[derive(Debug, Clone, PartialEq)]
pub struct LiveOptions {
    pub interval: Duration,
    /// Stop after this many ticks. `None` runs until the process is stopped.
    pub max_ticks: Option<u64>,
}

impl LiveOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            max_ticks: None,
        }
    }
}

/// Summary of a bounded live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveReport {
    pub ticks: u64,
    pub stats: RunStats,
    pub feed_failures: u64,
    pub events: u64,
    pub open_at_shutdown: usize,
    pub summary: LedgerSummary,
}

/// Maps feed timestamps to bar indices.
#[derive(Debug, Clone, Default)]
struct LiveClock {
    last: Option<Tick>,
}

impl LiveClock {
    /// Tick for a row at `time`; `None` if the feed went backwards.
    fn advance(&mut self, time: NaiveDateTime) -> Option<Tick> {
        let tick = match self.last {
            None => Tick::new(0, time),
            Some(last) if time == last.time => last,
            Some(last) if time > last.time => Tick::new(last.index + 1, time),
            Some(_) => return None,
        };
        self.last = Some(tick);
        Some(tick)
    }
}

/// Build everything from `config` and poll the configured live CSV.
pub fn run_live_from_config(
    config: &RunConfig,
    options: &LiveOptions,
) -> Result<LiveReport, RunError> {
    if config.mode != RunMode::Live {
        return Err(RunError::Mode {
            expected: RunMode::Live,
            actual: config.mode,
        });
    }
    let components = config.components()?;
    let required = config.required_features(components.signal.as_ref());
    let live_path = config
        .data
        .live_path
        .clone()
        .ok_or(crate::config::ConfigError::Missing("data.live_path"))?;
    let mut feed = CsvTailFeed::new(
        live_path,
        config.symbol.clone(),
        config.csv_columns(),
        required.clone(),
    );
    let ledger = RunSink::open(config.trade_log.as_deref()).into_ledger()?;
    let mut engine = config.build_engine(ledger, required)?;

    info!(
        run_id = %config.run_id(),
        symbol = %config.symbol,
        interval_secs = options.interval.as_secs(),
        signal = components.signal.name(),
        notifier = components.notifier.name(),
        "live session started"
    );
    Ok(run_live(&mut engine, &components, &mut feed, options))
}

/// Poll `feed` until `max_ticks` is reached.
pub fn run_live<S: TradeSink>(
    engine: &mut LifecycleEngine<S>,
    components: &Components,
    feed: &mut dyn LiveFeed,
    options: &LiveOptions,
) -> LiveReport {
    let specs: Vec<HorizonSpec> = engine.horizon_specs().cloned().collect();
    let mut clock = LiveClock::default();
    let mut stats = RunStats::default();
    let mut feed_failures = 0;
    let mut events = 0;
    let mut ticks = 0;

    loop {
        if options.max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }
        ticks += 1;

        match feed.latest() {
            Ok(Some(row)) => match clock.advance(row.bar.timestamp) {
                Some(tick) => {
                    let readings = score_row(components, &specs, &row);
                    log_tick(&specs, tick, &row, &readings);
                    let emitted =
                        apply_row(engine, components, &specs, tick, &row, readings, false, &mut stats);
                    events += emitted.len() as u64;
                }
                None => {
                    warn!(time = %row.bar.timestamp, "feed went backwards; tick skipped");
                    *stats.skipped.entry(SkipReason::OutOfOrder).or_default() += specs.len() as u64;
                }
            },
            Ok(None) => {
                info!(tick = ticks, feed = feed.name(), "no complete row yet; tick skipped");
                feed_failures += 1;
            }
            Err(e) => {
                warn!(tick = ticks, feed = feed.name(), error = %e, "feed failed; tick skipped");
                feed_failures += 1;
            }
        }

        if options.max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }
        thread::sleep(options.interval);
    }

    let open_at_shutdown = engine.open_positions();
    if open_at_shutdown > 0 {
        warn!(open = open_at_shutdown, "live session stopped with open positions; they are not persisted");
    }
    LiveReport {
        ticks,
        stats,
        feed_failures,
        events,
        open_at_shutdown,
        summary: engine.ledger().summary(),
    }
}

/// One line per tick: strategy, per-horizon signal, price.
fn log_tick(
    specs: &[HorizonSpec],
    tick: Tick,
    row: &HistoryRow,
    readings: &[Result<SignalReading, ScoringError>],
) {
    let signals: Vec<String> = specs
        .iter()
        .zip(readings)
        .map(|(spec, r)| match r {
            Ok(r) => format!(
                "{}={:.4}{}",
                spec.id,
                r.probability,
                if r.bullish { "+" } else { "-" }
            ),
            Err(_) => format!("{}=n/a", spec.id),
        })
        .collect();
    info!(
        bar = tick.index,
        time = %row.bar.timestamp,
        strategy = row.snapshot.category.as_deref().unwrap_or("-"),
        signals = %signals.join(" "),
        price = row.bar.close,
        "tick"
    );
}
