//! TickReplay CLI — restore ticks and run backtests.
//!
//! Commands:
//! - `run` — replay one config, or several in parallel as a portfolio
//! - `restore` — download one-minute klines into the tick store only
//!
//! `--restore-ticks true` wipes the stored ticks and downloads the whole range;
//! `--restore-ticks false` resumes after the newest stored tick. Without the
//! flag the run uses whatever the store already holds.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tickreplay_runner::{
    summarize, AssetOutcome, BacktestConfig, BacktestSession, DateRange, PortfolioRunner,
    RestoreMode, RunReport,
};

#[derive(Parser)]
#[command(name = "tickreplay", about = "TickReplay — tick-driven crypto backtesting engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay stored ticks through the configured strategies.
    Run {
        /// TOML config files. More than one runs them as a portfolio.
        #[arg(long = "config", required = true)]
        configs: Vec<PathBuf>,

        /// First day of the range (YYYY-MM-DD).
        #[arg(long)]
        from_date: NaiveDate,

        /// Last day of the range, inclusive (YYYY-MM-DD).
        #[arg(long)]
        to_date: NaiveDate,

        /// Download ticks before running: true = full restore, false = resume.
        #[arg(long)]
        restore_ticks: Option<bool>,

        /// Run portfolio configs one after another instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Print the full report as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Download one-minute klines into the tick store.
    Restore {
        /// TOML config file naming the asset and gateway.
        #[arg(long)]
        config: PathBuf,

        /// First day of the range (YYYY-MM-DD).
        #[arg(long)]
        from_date: NaiveDate,

        /// Last day of the range, inclusive (YYYY-MM-DD).
        #[arg(long)]
        to_date: NaiveDate,

        /// Resume after the newest stored tick instead of a full restore.
        #[arg(long, default_value_t = false)]
        resume: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level, cli.json_logs) {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(2);
    }

    let result = match cli.command {
        Commands::Run {
            configs,
            from_date,
            to_date,
            restore_ticks,
            sequential,
            json,
        } => run_cmd(configs, from_date, to_date, restore_ticks, sequential, json),
        Commands::Restore {
            config,
            from_date,
            to_date,
            resume,
        } => restore_cmd(config, from_date, to_date, resume),
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
    }
    Ok(())
}

fn restore_mode(flag: Option<bool>) -> Option<RestoreMode> {
    flag.map(|full| if full { RestoreMode::Full } else { RestoreMode::Resume })
}

fn run_cmd(
    paths: Vec<PathBuf>,
    from: NaiveDate,
    to: NaiveDate,
    restore_ticks: Option<bool>,
    sequential: bool,
    json: bool,
) -> Result<()> {
    let range = DateRange::new(from, to)?;
    let restore = restore_mode(restore_ticks);
    let configs = paths
        .iter()
        .map(|p| BacktestConfig::load(p).with_context(|| format!("loading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    if let [config] = configs.as_slice() {
        let session = BacktestSession::new(config.clone(), range)?;
        let report = session.run(restore)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        return Ok(());
    }

    let outcomes = PortfolioRunner::new()
        .with_parallelism(!sequential)
        .run(&configs, range, restore);
    print_portfolio(&outcomes, json)?;
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        bail!("{failed} of {} assets failed", outcomes.len());
    }
    Ok(())
}

fn restore_cmd(path: PathBuf, from: NaiveDate, to: NaiveDate, resume: bool) -> Result<()> {
    let config = BacktestConfig::load(&path).with_context(|| format!("loading {}", path.display()))?;
    let session = BacktestSession::new(config, DateRange::new(from, to)?)?;
    let mode = if resume { RestoreMode::Resume } else { RestoreMode::Full };
    let report = session.restore(mode)?;
    println!(
        "Restored {} ({:?}): {} fetched, {} stored",
        report.symbol, report.mode, report.fetched, report.stored
    );
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("=== Backtest Session ===");
    println!("Session:        {}", report.session_id);
    println!("Symbol:         {}", report.symbol);
    println!("Period:         {} to {}", report.range.from, report.range.to);
    println!(
        "Ticks:          {} of {} minutes ({:.2}% quality)",
        report.ticks, report.expected_minutes, report.quality_pct
    );
    println!("Duration:       {}", report.duration);
    println!("Output:         {}", report.output_dir.display());
    for snapshot in &report.snapshots {
        let m = &snapshot.metrics;
        println!();
        println!("--- {} ---", snapshot.strategy_id);
        println!("NAV:            {:.2} (allocation {:.2})", snapshot.nav, snapshot.allocation);
        println!("Performance:    {:.2}%", snapshot.performance_percentage() * 100.0);
        println!("Max Drawdown:   {:.2}%", snapshot.max_drawdown * 100.0);
        println!("Trades:         {}", snapshot.profit_history.len());
        println!("CAGR:           {:.2}%", m.cagr * 100.0);
        println!("Sharpe:         {:.3}", m.sharpe_ratio);
        println!("Sortino:        {:.3}", m.sortino_ratio);
        println!("Calmar:         {:.3}", m.calmar_ratio);
        println!("Profit Factor:  {:.2}", m.profit_factor);
        println!("Recovery:       {:.2}", m.recovery_factor);
        println!("Ulcer Index:    {:.3}", m.ulcer_index);
        println!("ES (95%):       {:.4}", m.expected_shortfall);
        println!("R²:             {:.3}", m.r2);
    }
    for worker in report.workers.iter().filter(|w| w.failed > 0) {
        println!("WARNING: worker '{}' failed {} commands", worker.name, worker.failed);
    }
    println!();
}

fn print_portfolio(outcomes: &[AssetOutcome], json: bool) -> Result<()> {
    let summary = summarize(outcomes);
    if json {
        let reports: Vec<&RunReport> = outcomes.iter().filter_map(|o| o.result.as_ref().ok()).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "summary": summary,
                "reports": reports,
            }))?
        );
    } else {
        for outcome in outcomes {
            match &outcome.result {
                Ok(report) => print_report(report),
                Err(e) => println!("{}: FAILED ({e})", outcome.symbol),
            }
        }
        println!("=== Portfolio ===");
        println!("Assets:         {} ({} failed)", summary.assets, summary.failed);
        println!("Allocation:     {:.2}", summary.allocation);
        println!("NAV:            {:.2}", summary.nav);
        println!("Performance:    {:.2}%", summary.performance_percentage() * 100.0);
    }
    Ok(())
}
