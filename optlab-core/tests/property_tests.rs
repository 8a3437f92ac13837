//! Property tests for lifecycle invariants.
//!
//! Uses proptest to verify, over random price paths and probability streams:
//! 1. Event sequences alternate entry → close per horizon
//! 2. Cooldown exclusion between consecutive entries
//! 3. Level ordering `sl < entry < tp` and exit-reason consistency
//! 4. Partial take-profit fires at most once per position
//! 5. PnL conservation: ledger totals equal the sum of trade PnL
//! 6. End-of-data closure: nothing survives a finite replay

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::collections::BTreeMap;
use optlab_core::domain::{
    EventKind, ExitReason, FeatureSnapshot, HorizonId, HorizonSpec, LifecycleEvent, Tick,
};
use optlab_core::engine::{BarInput, EngineConfig, LifecycleEngine, SignalReading};
use optlab_core::policy::{CooldownBasis, CooldownWindow};

// ── Strategies (proptest) ────────────────────────────────────────────

/// (underlying move, probability, bullish) per bar.
fn arb_path(max_len: usize) -> impl Strategy<Value = Vec<(f64, f64, bool)>> {
    prop::collection::vec(
        (-1.5..1.5_f64, 0.0..=1.0_f64, any::<bool>()),
        2..max_len,
    )
}

fn arb_basis() -> impl Strategy<Value = CooldownBasis> {
    prop_oneof![Just(CooldownBasis::Entry), Just(CooldownBasis::Exit)]
}

fn minute(i: u64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
        + chrono::Duration::minutes(i as i64)
}

fn horizons(cooldown: impl Fn(u64) -> CooldownWindow) -> Vec<HorizonSpec> {
    vec![
        HorizonSpec::new(3, 3, 0.55, cooldown(2)),
        HorizonSpec::new(8, 8, 0.6, cooldown(5)),
    ]
}

/// Drive the engine over the path, evaluating every horizon on every bar.
fn drive(engine: &mut LifecycleEngine, path: &[(f64, f64, bool)]) -> Vec<LifecycleEvent> {
    let ids: Vec<HorizonId> = engine.horizon_specs().map(|h| h.id).collect();
    let mut underlying = 500.0;
    let mut events = Vec::new();
    for (i, &(step, p, bullish)) in path.iter().enumerate() {
        underlying += step;
        let i = i as u64;
        let snapshot = FeatureSnapshot::new(minute(i)).with("obv", 1.0e6);
        let bar = BarInput {
            tick: Tick::new(i, minute(i)),
            underlying,
            snapshot: &snapshot,
            end_of_data: i as usize == path.len() - 1,
        };
        for &id in &ids {
            let reading = Ok(SignalReading {
                probability: p,
                bullish,
            });
            if let Some(event) = engine.evaluate(id, &bar, reading).unwrap() {
                events.push(event);
            }
        }
    }
    events
}

fn per_horizon(events: &[LifecycleEvent]) -> BTreeMap<HorizonId, Vec<&LifecycleEvent>> {
    let mut map: BTreeMap<HorizonId, Vec<&LifecycleEvent>> = BTreeMap::new();
    for e in events {
        map.entry(e.horizon).or_default().push(e);
    }
    map
}

// ── 1-3. Replay invariants ───────────────────────────────────────────

proptest! {
    /// Entries and closes alternate; at most one open position per horizon.
    #[test]
    fn entries_and_closes_alternate(path in arb_path(120), basis in arb_basis()) {
        let mut config = EngineConfig::replay("SPY", horizons(CooldownWindow::Bars));
        config.cooldown_basis = basis;
        let mut engine = LifecycleEngine::in_memory(config).unwrap();
        let events = drive(&mut engine, &path);

        for (_, seq) in per_horizon(&events) {
            let mut open = false;
            for e in seq {
                match e.kind {
                    EventKind::Entry => {
                        prop_assert!(!open, "entry while a position is open");
                        open = true;
                    }
                    EventKind::Exit | EventKind::Stop => {
                        prop_assert!(open, "close without an open position");
                        open = false;
                    }
                    EventKind::PartialTp => prop_assert!(false, "partial TP in replay"),
                }
            }
        }
    }

    /// No entry lands inside the cooldown window of the previous marker.
    #[test]
    fn cooldown_excludes_entries(path in arb_path(120), basis in arb_basis()) {
        let mut config = EngineConfig::replay("SPY", horizons(CooldownWindow::Bars));
        config.cooldown_basis = basis;
        let specs = config.horizons.clone();
        let mut engine = LifecycleEngine::in_memory(config).unwrap();
        let events = drive(&mut engine, &path);

        for (id, seq) in per_horizon(&events) {
            let Some(CooldownWindow::Bars(window)) =
                specs.iter().find(|s| s.id == id).map(|s| s.cooldown)
            else {
                unreachable!()
            };
            let mut marker: Option<u64> = None;
            for e in seq {
                match (e.kind, basis) {
                    (EventKind::Entry, _) => {
                        if let Some(m) = marker {
                            prop_assert!(e.bar_index - m >= window);
                        }
                        if basis == CooldownBasis::Entry {
                            marker = Some(e.bar_index);
                        }
                    }
                    (EventKind::Exit | EventKind::Stop, CooldownBasis::Exit) => {
                        marker = Some(e.bar_index);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Every trade has `sl < entry < tp` and an exit reason that matches
    /// where the market price ended up.
    #[test]
    fn levels_and_exit_reasons_consistent(path in arb_path(120)) {
        let config = EngineConfig::replay("SPY", horizons(CooldownWindow::Bars));
        let max_hold: BTreeMap<HorizonId, u64> =
            config.horizons.iter().map(|h| (h.id, h.max_hold)).collect();
        let mut engine = LifecycleEngine::in_memory(config).unwrap();
        drive(&mut engine, &path);
        let last = path.len() as u64 - 1;

        for t in engine.ledger().sink().trades() {
            prop_assert!(t.stop_loss < t.entry_price && t.entry_price < t.take_profit);
            prop_assert!(t.bars_held <= max_hold[&t.horizon]);
            prop_assert!(t.exit_price >= 0.0);
            match t.reason {
                ExitReason::TakeProfit => prop_assert!(t.exit_price >= t.take_profit),
                ExitReason::StopLoss => {
                    prop_assert!(t.exit_price <= t.stop_loss);
                    prop_assert!(t.exit_price < t.take_profit);
                }
                ExitReason::Time => {
                    prop_assert!(t.exit_price > t.stop_loss && t.exit_price < t.take_profit);
                    prop_assert_eq!(t.bars_held, max_hold[&t.horizon]);
                }
                ExitReason::EndOfData => {
                    prop_assert_eq!(t.exit_bar, last);
                    prop_assert!(t.exit_price > t.stop_loss && t.exit_price < t.take_profit);
                }
            }
        }
    }
}

// ── 4. Partial take-profit ───────────────────────────────────────────

proptest! {
    /// In live mode the partial take-profit fires at most once per position
    /// and never closes it.
    #[test]
    fn partial_take_profit_at_most_once(path in arb_path(120)) {
        let config = EngineConfig::live(
            "SPY",
            horizons(|bars| CooldownWindow::Seconds(bars * 60)),
        );
        let mut engine = LifecycleEngine::in_memory(config).unwrap();
        let events = drive(&mut engine, &path);

        for (_, seq) in per_horizon(&events) {
            let mut partials = 0;
            for e in seq {
                match e.kind {
                    EventKind::Entry => partials = 0,
                    EventKind::PartialTp => {
                        partials += 1;
                        prop_assert!(partials <= 1);
                    }
                    EventKind::Exit | EventKind::Stop => {}
                }
            }
        }
        let flagged = engine
            .ledger()
            .sink()
            .trades()
            .iter()
            .filter(|t| t.partial_tp_hit)
            .count();
        let fired = events
            .iter()
            .filter(|e| e.kind == EventKind::PartialTp)
            .count();
        prop_assert!(flagged <= fired);
    }
}

// ── 5-6. Ledger ──────────────────────────────────────────────────────

proptest! {
    /// Totals and per-horizon cumulative PnL equal the running sum of
    /// trade PnL, in append order.
    #[test]
    fn pnl_is_conserved(path in arb_path(150)) {
        let config = EngineConfig::replay("SPY", horizons(CooldownWindow::Bars));
        let mut engine = LifecycleEngine::in_memory(config).unwrap();
        drive(&mut engine, &path);
        let ledger = engine.ledger();

        let mut total = 0.0;
        let mut running: BTreeMap<HorizonId, f64> = BTreeMap::new();
        for t in ledger.sink().trades() {
            total += t.pnl;
            let cum = running.entry(t.horizon).or_insert(0.0);
            *cum += t.pnl;
            prop_assert_eq!(t.cumulative_pnl, *cum);
            prop_assert!(((t.exit_price - t.entry_price) * 100.0 - t.pnl).abs() < 1e-9);
        }
        prop_assert_eq!(ledger.total_pnl(), total);
        for (id, cum) in running {
            prop_assert_eq!(ledger.cumulative_pnl(id), cum);
        }
        prop_assert_eq!(ledger.trade_count() as usize, ledger.sink().trades().len());
        prop_assert_eq!(ledger.summary().trade_count, ledger.trade_count());
    }

    /// A finite replay ends with every horizon flat.
    #[test]
    fn replay_ends_flat(path in arb_path(80)) {
        let config = EngineConfig::replay("SPY", horizons(CooldownWindow::Bars));
        let mut engine = LifecycleEngine::in_memory(config).unwrap();
        let events = drive(&mut engine, &path);
        prop_assert_eq!(engine.open_positions(), 0);

        let entries = events.iter().filter(|e| e.kind == EventKind::Entry).count();
        prop_assert_eq!(entries as u64, engine.ledger().trade_count());
    }
}
