//! optlab core: domain types, synthetic pricing, position lifecycle, trade ledger.
//!
//! This crate contains the stateful heart of the system:
//! - Domain types (bars, feature snapshots, horizons, positions, closed trades, events)
//! - Entry/exit policy (synthetic pricer, TP/SL levels, cooldown)
//! - Position lifecycle engine: at most one open position per horizon
//! - Trade ledger with per-horizon and per-category aggregates
//! - Seams for the external collaborators (signal source, trend, notifier)

pub mod components;
pub mod domain;
pub mod engine;
pub mod ledger;
pub mod policy;
