//! Position lifecycle engine: open, hold, or close each horizon's position.
//!
//! Each call to [`LifecycleEngine::evaluate`] handles one horizon on one bar
//! and performs at most one position mutation. Exit conditions are checked in
//! a fixed priority order and the first match wins:
//!
//! 1. synthetic price >= take-profit
//! 2. (live only) synthetic price >= partial take-profit, once, non-closing
//! 3. synthetic price <= stop-loss
//! 4. bars held >= horizon max hold
//! 5. (replay only) end of data

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use super::state::{EngineConfig, EngineConfigError, ExitFill, HorizonState, RunMode};
use crate::components::signal::{check_probability, ScoringError, SignalSource};
use crate::components::trend::TrendConfirmation;
use crate::domain::{
    ClosedTrade, Direction, EventKind, ExitReason, FeatureSnapshot, HorizonId, HorizonSpec,
    LifecycleEvent, Position, PositionTicket, SnapshotError, Tick,
};
use crate::ledger::{MemorySink, TradeLedger, TradeSink};
use crate::policy::{
    CooldownBasis, LinearDelta, PolicyViolation, SyntheticPricer, TieredTpSl, TpSlPolicy,
};

/// One bar as seen by the engine.
#[derive(Debug, Clone, Copy)]
pub struct BarInput<'a> {
    pub tick: Tick,
    pub underlying: f64,
    pub snapshot: &'a FeatureSnapshot,
    /// Last bar of a finite replay. Ignored in live mode.
    pub end_of_data: bool,
}

/// Signal values scored for one horizon on one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalReading {
    pub probability: f64,
    pub bullish: bool,
}

impl SignalReading {
    /// Score `horizon` on `snapshot` and read the trend confirmation.
    pub fn read(
        signal: &dyn SignalSource,
        trend: &dyn TrendConfirmation,
        snapshot: &FeatureSnapshot,
        horizon: &HorizonSpec,
    ) -> Result<Self, ScoringError> {
        let probability = signal.score(snapshot, horizon)?;
        let bullish = trend.is_bullish(snapshot).map_err(ScoringError::Trend)?;
        Ok(Self {
            probability,
            bullish,
        })
    }
}

/// Why an evaluation was skipped. A skipped evaluation mutates nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluateError {
    #[error("unknown horizon {0}")]
    UnknownHorizon(HorizonId),

    #[error("data unavailable: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("data unavailable: underlying price {0} is not usable")]
    BadPrice(f64),

    #[error("scoring failure: {0}")]
    Scoring(#[from] ScoringError),

    #[error("horizon {horizon}: bar index {got} precedes last evaluated index {last}")]
    OutOfOrder { horizon: HorizonId, last: u64, got: u64 },

    #[error("horizon {horizon}: entry rejected: {source}")]
    Policy {
        horizon: HorizonId,
        #[source]
        source: PolicyViolation,
    },
}

/// Error taxonomy used for skip accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DataUnavailable,
    ScoringFailure,
    PolicyViolation,
    OutOfOrder,
}

impl EvaluateError {
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            EvaluateError::UnknownHorizon(_)
            | EvaluateError::Snapshot(_)
            | EvaluateError::BadPrice(_) => SkipReason::DataUnavailable,
            EvaluateError::Scoring(ScoringError::Snapshot(_) | ScoringError::Trend(_)) => {
                SkipReason::DataUnavailable
            }
            EvaluateError::Scoring(_) => SkipReason::ScoringFailure,
            EvaluateError::OutOfOrder { .. } => SkipReason::OutOfOrder,
            EvaluateError::Policy { .. } => SkipReason::PolicyViolation,
        }
    }
}

/// Owns every horizon's state and the trade ledger.
pub struct LifecycleEngine<S: TradeSink = MemorySink> {
    config: EngineConfig,
    horizons: Vec<HorizonState>,
    pricer: Box<dyn SyntheticPricer>,
    tp_sl: Box<dyn TpSlPolicy>,
    required_features: Vec<String>,
    ledger: TradeLedger<S>,
}

impl LifecycleEngine<MemorySink> {
    /// Engine with an in-memory ledger and default policies.
    pub fn in_memory(config: EngineConfig) -> Result<Self, EngineConfigError> {
        Self::new(config, TradeLedger::in_memory())
    }
}

impl<S: TradeSink> LifecycleEngine<S> {
    pub fn new(config: EngineConfig, mut ledger: TradeLedger<S>) -> Result<Self, EngineConfigError> {
        config.validate()?;
        for h in &config.horizons {
            ledger.register(h.id, h.capital);
        }
        let horizons = config
            .horizons
            .iter()
            .cloned()
            .map(HorizonState::new)
            .collect();
        Ok(Self {
            config,
            horizons,
            pricer: Box::new(LinearDelta::default()),
            tp_sl: Box::new(TieredTpSl::default()),
            required_features: Vec::new(),
            ledger,
        })
    }

    pub fn with_pricer(mut self, pricer: impl SyntheticPricer + 'static) -> Self {
        self.pricer = Box::new(pricer);
        self
    }

    pub fn with_tp_sl(mut self, policy: impl TpSlPolicy + 'static) -> Self {
        self.tp_sl = Box::new(policy);
        self
    }

    /// Features every snapshot must carry before it is evaluated.
    pub fn with_required_features(mut self, features: Vec<String>) -> Self {
        self.required_features = features;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn horizon_specs(&self) -> impl Iterator<Item = &HorizonSpec> {
        self.horizons.iter().map(|h| &h.spec)
    }

    pub fn horizon(&self, id: HorizonId) -> Option<&HorizonState> {
        self.horizons.iter().find(|h| h.spec.id == id)
    }

    pub fn position(&self, id: HorizonId) -> Option<&Position> {
        self.horizon(id).and_then(|h| h.position.as_ref())
    }

    pub fn open_positions(&self) -> usize {
        self.horizons.iter().filter(|h| h.is_open()).count()
    }

    pub fn ledger(&self) -> &TradeLedger<S> {
        &self.ledger
    }

    pub fn into_ledger(self) -> TradeLedger<S> {
        self.ledger
    }

    /// Evaluate one horizon on one bar.
    ///
    /// All precondition failures return an error before any state changes:
    /// no entry, no exit check, no cooldown update.
    pub fn evaluate(
        &mut self,
        horizon: HorizonId,
        bar: &BarInput<'_>,
        signal: Result<SignalReading, ScoringError>,
    ) -> Result<Option<LifecycleEvent>, EvaluateError> {
        let idx = self
            .horizons
            .iter()
            .position(|h| h.spec.id == horizon)
            .ok_or(EvaluateError::UnknownHorizon(horizon))?;

        bar.snapshot.validate(self.required_features.as_slice())?;
        if !(bar.underlying.is_finite() && bar.underlying > 0.0) {
            return Err(EvaluateError::BadPrice(bar.underlying));
        }
        let reading = signal?;
        check_probability(reading.probability)?;

        let state = &mut self.horizons[idx];
        if let Some(last) = state.last_index {
            // Live polling may repeat a bar; replay evaluates each bar once.
            let repeated = bar.tick.index == last && self.config.mode == RunMode::Replay;
            if bar.tick.index < last || repeated {
                return Err(EvaluateError::OutOfOrder {
                    horizon,
                    last,
                    got: bar.tick.index,
                });
            }
        }
        state.last_index = Some(bar.tick.index);

        if state.is_open() {
            Ok(self.step_open(idx, bar))
        } else {
            self.try_enter(idx, bar, reading)
        }
    }

    /// Close every open position with reason end-of-data.
    ///
    /// Used by replay when the final bar's evaluation was skipped; no
    /// position may survive a finite run.
    pub fn finish(&mut self, tick: Tick, underlying: f64) -> Vec<LifecycleEvent> {
        (0..self.horizons.len())
            .filter(|&i| self.horizons[i].is_open())
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|i| self.close(i, tick, underlying, ExitReason::EndOfData))
            .collect()
    }

    fn try_enter(
        &mut self,
        idx: usize,
        bar: &BarInput<'_>,
        reading: SignalReading,
    ) -> Result<Option<LifecycleEvent>, EvaluateError> {
        let config = &self.config;
        let state = &mut self.horizons[idx];
        let spec = &state.spec;

        if bar.end_of_data && config.mode == RunMode::Replay {
            return Ok(None);
        }
        if state.cooldown.is_blocking(&spec.cooldown, &bar.tick) {
            debug!(horizon = %spec.id, bar = bar.tick.index, "entry blocked by cooldown");
            return Ok(None);
        }
        if !spec.accepts(reading.probability) {
            return Ok(None);
        }

        let entry_price = config.entry_premium;
        let (take_profit, stop_loss) = self.tp_sl.levels(entry_price, reading.probability);
        let partial_take_profit = match config.mode {
            RunMode::Live => config
                .partial_tp_pct
                .map(|pct| entry_price * (1.0 + pct))
                .filter(|level| *level < take_profit),
            RunMode::Replay => None,
        };
        let category = bar
            .snapshot
            .category
            .clone()
            .unwrap_or_else(|| spec.label.clone());
        let direction = Direction::from_trend(reading.bullish);

        let position = Position::open(PositionTicket {
            horizon: spec.id,
            category,
            entry: bar.tick,
            entry_price,
            entry_underlying: bar.underlying,
            direction,
            take_profit,
            stop_loss,
            partial_take_profit,
            entry_probability: reading.probability,
        })
        .map_err(|source| {
            error!(
                horizon = %spec.id,
                probability = reading.probability,
                take_profit,
                stop_loss,
                error = %source,
                "entry rejected by tp/sl policy"
            );
            EvaluateError::Policy {
                horizon: spec.id,
                source,
            }
        })?;

        info!(
            horizon = %spec.id,
            strategy = position.category(),
            direction = direction.as_str(),
            probability = reading.probability,
            price = bar.underlying,
            take_profit,
            stop_loss,
            "position opened"
        );

        let event = LifecycleEvent {
            kind: EventKind::Entry,
            horizon: spec.id,
            symbol: config.symbol.clone(),
            category: position.category().to_string(),
            direction,
            price: entry_price,
            underlying: bar.underlying,
            timestamp: bar.tick.time,
            bar_index: bar.tick.index,
            probability: Some(reading.probability),
            reason: None,
            pnl: None,
        };
        state.position = Some(position);
        if config.cooldown_basis == CooldownBasis::Entry {
            state.cooldown.mark(bar.tick);
        }
        Ok(Some(event))
    }

    fn step_open(&mut self, idx: usize, bar: &BarInput<'_>) -> Option<LifecycleEvent> {
        let end_of_data = bar.end_of_data && self.config.mode == RunMode::Replay;
        let state = &mut self.horizons[idx];
        let max_hold = state.spec.max_hold;
        let pos = state.position.as_mut()?;

        let held = pos.observe(&bar.tick);
        let price = self.pricer.price(
            pos.direction(),
            pos.entry_price(),
            pos.entry_underlying(),
            bar.underlying,
        );

        let reason = if price >= pos.take_profit() {
            Some(ExitReason::TakeProfit)
        } else if pos
            .partial_take_profit()
            .is_some_and(|level| price >= level && !pos.partial_tp_hit())
        {
            pos.mark_partial_tp();
            info!(horizon = %pos.horizon(), price, "partial take-profit reached");
            return Some(LifecycleEvent {
                kind: EventKind::PartialTp,
                horizon: pos.horizon(),
                symbol: self.config.symbol.clone(),
                category: pos.category().to_string(),
                direction: pos.direction(),
                price,
                underlying: bar.underlying,
                timestamp: bar.tick.time,
                bar_index: bar.tick.index,
                probability: None,
                reason: None,
                pnl: None,
            });
        } else if price <= pos.stop_loss() {
            Some(ExitReason::StopLoss)
        } else if held >= max_hold {
            Some(ExitReason::Time)
        } else if end_of_data {
            Some(ExitReason::EndOfData)
        } else {
            None
        };

        reason.and_then(|r| self.close(idx, bar.tick, bar.underlying, r))
    }

    fn close(
        &mut self,
        idx: usize,
        tick: Tick,
        underlying: f64,
        reason: ExitReason,
    ) -> Option<LifecycleEvent> {
        let state = &mut self.horizons[idx];
        let mut pos = state.position.take()?;
        let held = pos.observe(&tick);

        let market = self.pricer.price(
            pos.direction(),
            pos.entry_price(),
            pos.entry_underlying(),
            underlying,
        );
        let exit_price = match (self.config.exit_fill, reason) {
            (ExitFill::Capped, ExitReason::TakeProfit) => pos.take_profit(),
            (ExitFill::Capped, ExitReason::StopLoss) => pos.stop_loss(),
            _ => market,
        };
        let pnl = (exit_price - pos.entry_price()) * self.config.contract_multiplier;

        let trade = self.ledger.append(ClosedTrade {
            symbol: self.config.symbol.clone(),
            horizon: pos.horizon(),
            category: pos.category().to_string(),
            direction: pos.direction(),
            entry_bar: pos.entry().index,
            entry_time: pos.entry().time,
            entry_price: pos.entry_price(),
            entry_underlying: pos.entry_underlying(),
            entry_probability: pos.entry_probability(),
            take_profit: pos.take_profit(),
            stop_loss: pos.stop_loss(),
            exit_bar: tick.index,
            exit_time: tick.time,
            exit_price,
            exit_underlying: underlying,
            reason,
            bars_held: held,
            partial_tp_hit: pos.partial_tp_hit(),
            pnl,
            cumulative_pnl: 0.0,
        });

        if self.config.cooldown_basis == CooldownBasis::Exit {
            state.cooldown.mark(tick);
        }

        info!(
            horizon = %trade.horizon,
            strategy = %trade.category,
            reason = reason.as_str(),
            price = exit_price,
            pnl,
            cumulative_pnl = trade.cumulative_pnl,
            "position closed"
        );

        Some(LifecycleEvent {
            kind: if reason == ExitReason::StopLoss {
                EventKind::Stop
            } else {
                EventKind::Exit
            },
            horizon: trade.horizon,
            symbol: trade.symbol,
            category: trade.category,
            direction: trade.direction,
            price: exit_price,
            underlying,
            timestamp: tick.time,
            bar_index: tick.index,
            probability: None,
            reason: Some(reason),
            pnl: Some(pnl),
        })
    }
}
