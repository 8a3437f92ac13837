//! Reporting and export: CSV, JSON, and Markdown artifact generation.
//!
//! - **CSV**: the closed-trade tape, streamed row by row
//! - **JSON**: the replay result with its ledger summary
//! - **Markdown**: a human-readable run report with per-horizon and
//!   per-category tables

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use optlab_core::domain::{ClosedTrade, HorizonId};
use optlab_core::ledger::{JsonlTradeLog, LedgerError, LedgerSummary};

use crate::replay::ReplayResult;

// ─── CSV export ─────────────────────────────────────────────────────

pub const TRADE_COLUMNS: [&str; 11] = [
    "timestamp",
    "horizon",
    "category",
    "direction",
    "entry_price",
    "exit_price",
    "entry_underlying",
    "exit_underlying",
    "pnl",
    "reason",
    "cumulative_pnl",
];

/// Stream trades into `writer` as CSV. `timestamp` is the exit time.
///
/// Returns the number of trades written. Stops at the first unreadable
/// trade.
pub fn write_trades_csv<W, I>(trades: I, writer: W) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Result<ClosedTrade, LedgerError>>,
{
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(TRADE_COLUMNS)?;

    let mut count = 0;
    for trade in trades {
        let t = trade.context("failed to read trade")?;
        wtr.write_record([
            t.exit_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            t.horizon.to_string(),
            t.category.clone(),
            t.direction.as_str().to_string(),
            format!("{:.4}", t.entry_price),
            format!("{:.4}", t.exit_price),
            format!("{:.2}", t.entry_underlying),
            format!("{:.2}", t.exit_underlying),
            format!("{:.2}", t.pnl),
            t.reason.as_str().to_string(),
            format!("{:.2}", t.cumulative_pnl),
        ])?;
        count += 1;
    }
    wtr.flush().context("failed to flush CSV writer")?;
    Ok(count)
}

/// Export a JSONL trade log to a CSV file.
pub fn export_trade_log_csv(log: &JsonlTradeLog, out: &Path) -> Result<usize> {
    let stream = log
        .stream()
        .with_context(|| format!("failed to open trade log {}", log.path().display()))?;
    let file = std::fs::File::create(out)
        .with_context(|| format!("failed to create {}", out.display()))?;
    write_trades_csv(stream, std::io::BufWriter::new(file))
}

/// Rebuild a ledger summary from a JSONL trade log without loading it
/// whole.
pub fn summarize_trade_log(
    log: &JsonlTradeLog,
    capital: &BTreeMap<HorizonId, f64>,
) -> Result<LedgerSummary> {
    let stream = log
        .stream()
        .with_context(|| format!("failed to open trade log {}", log.path().display()))?;
    let mut failure = None;
    let summary = LedgerSummary::from_trades(
        stream.map_while(|r| match r {
            Ok(t) => Some(t),
            Err(e) => {
                failure = Some(e);
                None
            }
        }),
        capital,
    );
    if let Some(e) = failure {
        return Err(e).with_context(|| format!("corrupt trade log {}", log.path().display()));
    }
    Ok(summary)
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &ReplayResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize ReplayResult to JSON")
}

pub fn summary_json(summary: &LedgerSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize LedgerSummary to JSON")
}

// ─── Markdown reports ───────────────────────────────────────────────

/// Generate a Markdown report for a replay.
pub fn generate_report(result: &ReplayResult) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Replay Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run ID | {} |\n", result.run_id));
    md.push_str(&format!("| Bars | {} |\n", result.bar_count));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    if result.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    if let Some(path) = &result.trade_log {
        md.push_str(&format!("| Trade Log | {} |\n", path.display()));
    }
    md.push('\n');

    md.push_str(&summary_tables(&result.summary));

    let skipped: u64 = result.skipped.values().sum();
    if skipped > 0 || result.notifications_failed > 0 || result.sink_failures > 0 {
        md.push_str("## Skipped Evaluations\n\n");
        for (reason, n) in &result.skipped {
            md.push_str(&format!("- {reason:?}: {n}\n"));
        }
        if result.notifications_failed > 0 {
            md.push_str(&format!(
                "- Failed notifications: {}\n",
                result.notifications_failed
            ));
        }
        if result.sink_failures > 0 {
            md.push_str(&format!("- Trade log write failures: {}\n", result.sink_failures));
        }
        md.push('\n');
    }

    md
}

/// Performance, per-horizon and per-category tables.
pub fn summary_tables(s: &LedgerSummary) -> String {
    let mut md = String::with_capacity(1024);

    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Trades | {} |\n", s.trade_count));
    md.push_str(&format!("| Total PnL | {:+.2} |\n", s.total_pnl));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", s.win_rate * 100.0));
    md.push_str(&format!("| Avg Bars Held | {:.1} |\n", s.avg_bars_held));
    for (reason, n) in &s.exit_reasons {
        md.push_str(&format!("| Exits: {reason} | {n} |\n"));
    }
    md.push('\n');

    md.push_str("## Horizons\n\n");
    md.push_str("| Horizon | Trades | Win Rate | Cumulative PnL | Capital | Ending Capital | Avg Bars Held |\n");
    md.push_str("| --- | ---: | ---: | ---: | ---: | ---: | ---: |\n");
    for h in &s.horizons {
        md.push_str(&format!(
            "| {} | {} | {:.1}% | {:+.2} | {:.2} | {:.2} | {:.1} |\n",
            h.horizon,
            h.trades,
            h.win_rate * 100.0,
            h.cumulative_pnl,
            h.capital,
            h.ending_capital,
            h.avg_bars_held
        ));
    }
    md.push('\n');

    if !s.categories.is_empty() {
        md.push_str("## Categories\n\n");
        md.push_str("| Category | Trades | Win Rate | Total PnL |\n");
        md.push_str("| --- | ---: | ---: | ---: |\n");
        for c in &s.categories {
            md.push_str(&format!(
                "| {} | {} | {:.1}% | {:+.2} |\n",
                c.category,
                c.trades,
                c.win_rate * 100.0,
                c.total_pnl
            ));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optlab_core::domain::{Direction, ExitReason};

    fn trade(horizon: u32, pnl: f64, cumulative: f64) -> ClosedTrade {
        let t0 = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        ClosedTrade {
            symbol: "SPY".into(),
            horizon: HorizonId(horizon),
            category: "Scalp Reversal".into(),
            direction: Direction::Put,
            entry_bar: 0,
            entry_time: t0,
            entry_price: 1.0,
            entry_underlying: 500.0,
            entry_probability: 0.7,
            take_profit: 1.3,
            stop_loss: 0.85,
            exit_bar: 2,
            exit_time: t0 + chrono::Duration::minutes(2),
            exit_price: 1.0 + pnl / 100.0,
            exit_underlying: 499.0,
            reason: ExitReason::Time,
            bars_held: 2,
            partial_tp_hit: false,
            pnl,
            cumulative_pnl: cumulative,
        }
    }

    #[test]
    fn csv_has_fixed_columns() {
        let mut out = Vec::new();
        let n = write_trades_csv([Ok(trade(10, 12.5, 12.5))], &mut out).unwrap();
        assert_eq!(n, 1);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), TRADE_COLUMNS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "2024-03-01 10:02:00,h10,Scalp Reversal,PUT,1.0000,1.1250,500.00,499.00,12.50,time,12.50"
        );
    }

    #[test]
    fn csv_stops_at_unreadable_trade() {
        let bad = serde_json::from_str::<ClosedTrade>("{").unwrap_err();
        let trades = vec![
            Ok(trade(10, 5.0, 5.0)),
            Err(LedgerError::Decode { line: 2, source: bad }),
            Ok(trade(10, 5.0, 10.0)),
        ];
        let err = write_trades_csv(trades, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("failed to read trade"));
    }

    #[test]
    fn summary_of_corrupt_log_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", serde_json::to_string(&trade(5, 5.0, 5.0)).unwrap()).unwrap();
        writeln!(file, "not json").unwrap();
        file.flush().unwrap();

        let log = JsonlTradeLog::new(file.path());
        let err = summarize_trade_log(&log, &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("corrupt trade log"));
    }

    #[test]
    fn summary_of_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlTradeLog::new(dir.path().join("none.jsonl"));
        let capital = [(HorizonId(5), 2_500.0)].into_iter().collect();
        let summary = summarize_trade_log(&log, &capital).unwrap();
        assert_eq!(summary.trade_count, 0);
        assert_eq!(summary.horizons[0].ending_capital, 2_500.0);
        assert!(summary_tables(&summary).contains("| h5 | 0 |"));
    }
}
