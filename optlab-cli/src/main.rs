//! optlab CLI: replay, live, export and summary commands.
//!
//! Commands:
//! - `replay`: run the lifecycle engine over a history CSV (or synthetic data)
//! - `live`: poll a live feature CSV and trade each new bar
//! - `export`: convert a JSONL trade log to the CSV trade tape
//! - `summary`: rebuild per-horizon and per-category aggregates from a trade log

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use optlab_core::domain::HorizonId;
use optlab_core::ledger::JsonlTradeLog;
use optlab_runner::export::{
    export_json, export_trade_log_csv, generate_report, summarize_trade_log, summary_json,
    summary_tables, write_trades_csv,
};
use optlab_runner::{
    load_history, run_live_from_config, run_replay, synthetic_history, LiveOptions, LiveReport,
    ReplayResult, RunConfig,
};

#[derive(Parser)]
#[command(
    name = "optlab",
    about = "optlab CLI: synthetic options position lifecycle engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a history CSV through the lifecycle engine.
    Replay {
        /// Path to a TOML run config (mode = "replay").
        #[arg(long)]
        config: PathBuf,

        /// Replay this many synthetic bars instead of data.history_path.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Write the trade tape as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write a Markdown report.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write the replay result as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Poll the live feature CSV and trade each new bar.
    Live {
        /// Path to a TOML run config (mode = "live").
        #[arg(long)]
        config: PathBuf,

        /// Stop after this many ticks. Runs until interrupted if omitted.
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Override poll_interval_secs from the config.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Convert a JSONL trade log to CSV.
    Export {
        /// JSONL trade log.
        #[arg(long)]
        log: PathBuf,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Summarize a JSONL trade log.
    Summary {
        /// JSONL trade log.
        #[arg(long)]
        log: PathBuf,

        /// Take per-horizon capital from this run config.
        #[arg(long, conflicts_with = "capital")]
        config: Option<PathBuf>,

        /// Capital assigned to every horizon found in the log.
        #[arg(long)]
        capital: Option<f64>,

        /// Print JSON instead of Markdown tables.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            config,
            synthetic,
            csv,
            report,
            json,
        } => run_replay_cmd(&config, synthetic, csv, report, json),
        Commands::Live {
            config,
            max_ticks,
            interval_secs,
        } => run_live_cmd(&config, max_ticks, interval_secs),
        Commands::Export { log, out } => {
            let log = JsonlTradeLog::new(log);
            let n = export_trade_log_csv(&log, &out)?;
            println!("Exported {n} trades to {}", out.display());
            Ok(())
        }
        Commands::Summary {
            log,
            config,
            capital,
            json,
        } => run_summary_cmd(log, config, capital, json),
    }
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

/// First synthetic bar: a regular-session open.
fn synthetic_start() -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .context("invalid synthetic start time")
}

fn run_replay_cmd(
    config_path: &Path,
    synthetic: Option<usize>,
    csv: Option<PathBuf>,
    report: Option<PathBuf>,
    json: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;

    let history = match synthetic {
        Some(count) => {
            let components = config.components()?;
            let features = config.required_features(components.signal.as_ref());
            synthetic_history(&config.symbol, synthetic_start()?, count, &features)
        }
        None => {
            let path = config
                .data
                .history_path
                .as_deref()
                .context("config has no data.history_path; pass --synthetic N to replay generated data")?;
            load_history(path, &config.symbol, &config.csv_columns())
                .with_context(|| format!("failed to load history {}", path.display()))?
        }
    };

    let (result, sink) = run_replay(&config, &history)?;
    print_replay(&result);

    if let Some(out) = csv {
        let file =
            File::create(&out).with_context(|| format!("failed to create {}", out.display()))?;
        let n = write_trades_csv(sink.trades(), BufWriter::new(file))?;
        println!("Trade tape ({n} trades): {}", out.display());
    }
    if let Some(out) = report {
        std::fs::write(&out, generate_report(&result))
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("Report: {}", out.display());
    }
    if let Some(out) = json {
        std::fs::write(&out, export_json(&result)?)
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("Result JSON: {}", out.display());
    }
    Ok(())
}

fn run_live_cmd(
    config_path: &Path,
    max_ticks: Option<u64>,
    interval_secs: Option<u64>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut options = LiveOptions::from_config(&config);
    options.max_ticks = max_ticks;
    if let Some(secs) = interval_secs {
        options.interval = Duration::from_secs(secs);
    }

    let report = run_live_from_config(&config, &options)?;
    print_live(&report);
    Ok(())
}

fn run_summary_cmd(
    log_path: PathBuf,
    config_path: Option<PathBuf>,
    capital: Option<f64>,
    json: bool,
) -> Result<()> {
    let log = JsonlTradeLog::new(log_path);

    let capital_map: BTreeMap<HorizonId, f64> = match (config_path, capital) {
        (Some(path), _) => load_config(&path)?
            .horizon_specs()?
            .into_iter()
            .map(|spec| (spec.id, spec.capital))
            .collect(),
        (None, Some(amount)) => {
            let mut map = BTreeMap::new();
            for trade in log.stream()? {
                map.insert(trade?.horizon, amount);
            }
            map
        }
        (None, None) => BTreeMap::new(),
    };

    let summary = summarize_trade_log(&log, &capital_map)?;
    if json {
        println!("{}", summary_json(&summary)?);
    } else {
        print!("{}", summary_tables(&summary));
    }
    Ok(())
}

fn print_replay(result: &ReplayResult) {
    let s = &result.summary;
    println!();
    println!("=== Replay Result ===");
    println!("Run ID:         {}", result.run_id);
    println!("Bars:           {}", result.bar_count);
    println!("Trades:         {}", s.trade_count);
    println!("Total PnL:      {:+.2}", s.total_pnl);
    println!("Win Rate:       {:.1}%", s.win_rate * 100.0);
    println!("Avg Bars Held:  {:.1}", s.avg_bars_held);
    for (reason, n) in &s.exit_reasons {
        println!("  {:<14}{n}", format!("{reason}:"));
    }
    println!();
    println!("--- Horizons ---");
    for h in &s.horizons {
        println!(
            "{:<6} trades {:>4}  win {:>5.1}%  pnl {:>+10.2}  capital {:>10.2}",
            h.horizon.to_string(),
            h.trades,
            h.win_rate * 100.0,
            h.cumulative_pnl,
            h.ending_capital
        );
    }
    let skipped: u64 = result.skipped.values().sum();
    if skipped > 0 {
        println!();
        println!("Skipped evaluations: {skipped}");
        for (reason, n) in &result.skipped {
            println!("  {reason:?}: {n}");
        }
    }
    if result.notifications_failed > 0 {
        println!("WARNING: {} notifications failed", result.notifications_failed);
    }
    if result.sink_failures > 0 {
        println!("WARNING: {} trades could not be written to the log", result.sink_failures);
    }
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

fn print_live(report: &LiveReport) {
    println!();
    println!("=== Live Session ===");
    println!("Ticks:          {}", report.ticks);
    println!("Events:         {}", report.events);
    println!("Trades closed:  {}", report.summary.trade_count);
    println!("Total PnL:      {:+.2}", report.summary.total_pnl);
    println!("Feed failures:  {}", report.feed_failures);
    println!("Skipped:        {}", report.stats.skipped_total());
    if report.open_at_shutdown > 0 {
        println!(
            "WARNING: {} open position(s) dropped at shutdown",
            report.open_at_shutdown
        );
    }
    println!();
}
