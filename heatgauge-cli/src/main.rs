//! Heatgauge CLI: refresh, inspect and export per-symbol heat snapshots.
//!
//! Commands:
//! - `refresh`: run the full pipeline for one symbol (or all with `--all`)
//! - `show`: print score, regime and recommendation for a symbol
//! - `report`: print the markdown report for a symbol
//! - `status`: report cache state per configured symbol
//! - `export`: write a symbol's bars and indicator columns as CSV

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use heatgauge_core::data::{CircuitBreaker, DataProvider, SyntheticProvider, YahooProvider};
use heatgauge_core::domain::Timeframe;
use heatgauge_core::indicators::IndicatorFrame;
use heatgauge_core::{AppConfig, Orchestrator, PipelineState, StateSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "heatgauge",
    about = "Heatgauge: market heat score and DCA sizing"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use seeded synthetic data instead of Yahoo Finance.
    #[arg(long, global = true, default_value_t = false)]
    synthetic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, validate, cache and score a symbol.
    Refresh {
        /// Symbol to refresh. Defaults to the configured default symbol.
        symbol: Option<String>,

        /// Refresh every configured symbol in parallel.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Print the current score, regime and recommendation.
    Show {
        symbol: Option<String>,

        /// Emit the summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the markdown report.
    Report { symbol: Option<String> },
    /// Report cache state for every configured symbol.
    Status,
    /// Export bars plus indicator columns as CSV.
    Export {
        symbol: String,

        /// hourly or daily.
        #[arg(long, default_value = "daily")]
        timeframe: Timeframe,

        /// Output file.
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(config = ?cli.config, synthetic = cli.synthetic, "configuration loaded");
    let orchestrator = Orchestrator::new(config, provider(cli.synthetic)?)?;

    match cli.command {
        Commands::Refresh { symbol, all } => run_refresh(&orchestrator, symbol, all),
        Commands::Show { symbol, json } => run_show(&orchestrator, symbol, json),
        Commands::Report { symbol } => {
            let state = resolve_state(&orchestrator, symbol)?;
            println!("{}", state.report());
            Ok(())
        }
        Commands::Status => run_status(&orchestrator),
        Commands::Export {
            symbol,
            timeframe,
            out,
        } => run_export(&orchestrator, &symbol, timeframe, &out),
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

fn provider(synthetic: bool) -> Result<Arc<dyn DataProvider>> {
    if synthetic {
        return Ok(Arc::new(SyntheticProvider::new(42)));
    }
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(Arc::new(YahooProvider::new(circuit_breaker)?))
}

/// The default symbol goes through `initialize` so its fallback gets seeded.
fn resolve_state(orchestrator: &Orchestrator, symbol: Option<String>) -> Result<Arc<PipelineState>> {
    let state = match symbol {
        Some(symbol) => orchestrator.get_state(&symbol)?,
        None => orchestrator.initialize()?,
    };
    Ok(state)
}

fn run_refresh(orchestrator: &Orchestrator, symbol: Option<String>, all: bool) -> Result<()> {
    if all {
        if symbol.is_some() {
            bail!("SYMBOL and --all are mutually exclusive");
        }
        let mut failed = 0;
        for (symbol, outcome) in orchestrator.refresh_all() {
            match outcome {
                Ok(state) => print_summary(&StateSummary::from(state.as_ref())),
                Err(e) => {
                    failed += 1;
                    eprintln!("Error for {symbol}: {e}");
                }
            }
        }
        if failed > 0 {
            bail!("{failed} symbol(s) failed to refresh");
        }
        return Ok(());
    }

    let symbol = match symbol {
        Some(symbol) => symbol,
        None => orchestrator
            .config()
            .symbols
            .default_symbol()
            .context("no default symbol configured")?
            .to_string(),
    };
    let state = orchestrator.refresh(&symbol)?;
    print_summary(&StateSummary::from(state.as_ref()));
    Ok(())
}

fn run_show(orchestrator: &Orchestrator, symbol: Option<String>, json: bool) -> Result<()> {
    let state = resolve_state(orchestrator, symbol)?;
    let summary = StateSummary::from(state.as_ref());
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    print_summary(&summary);
    println!("--- Components ---");
    for c in &state.heat_score().components {
        println!(
            "{:<18} raw {:>10.4}  norm {:>5.1}  w {:>4.2}  → {:>5.1}",
            c.name(),
            c.raw_value,
            c.normalized,
            c.weight,
            c.contribution
        );
    }
    println!();
    println!("--- Reasoning ---");
    for line in &state.dca().reasoning {
        println!("  {line}");
    }
    println!();
    Ok(())
}

fn run_status(orchestrator: &Orchestrator) -> Result<()> {
    let cache_dir = orchestrator.store().cache_dir();
    println!("Cache: {}", cache_dir.display());
    println!();
    println!(
        "{:<10} {:<8} {:<10} {:>8} {:>8}  {}",
        "Symbol", "Cached", "Active", "Hourly", "Daily", "Last Refresh"
    );
    println!("{}", "-".repeat(70));
    for status in orchestrator.cache_status() {
        let rows = |n: Option<usize>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<10} {:<8} {:<10} {:>8} {:>8}  {}",
            status.symbol,
            if status.cached { "yes" } else { "no" },
            status.active_symbol.as_deref().unwrap_or("-"),
            rows(status.hourly_rows),
            rows(status.daily_rows),
            status
                .last_refresh
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never".into()),
        );
    }
    Ok(())
}

fn run_export(orchestrator: &Orchestrator, symbol: &str, timeframe: Timeframe, out: &Path) -> Result<()> {
    let state = orchestrator.get_state(symbol)?;
    let frame = state.frame(timeframe);
    if frame.is_empty() {
        bail!("no {timeframe} rows for {symbol}");
    }
    let rows = write_frame_csv(frame, out)?;
    println!("Wrote {rows} {timeframe} rows for {} to {}", state.active_symbol(), out.display());
    Ok(())
}

/// Columns: timestamp, open, high, low, close, volume, then every derived
/// column. Undefined values are written as empty fields.
fn write_frame_csv(frame: &IndicatorFrame, out: &Path) -> Result<usize> {
    let mut wtr = csv::Writer::from_path(out)
        .with_context(|| format!("creating {}", out.display()))?;

    let derived: Vec<&str> = frame.column_names().collect();
    let mut header = vec!["timestamp", "open", "high", "low", "close", "volume"];
    header.extend(derived.iter().copied());
    wtr.write_record(&header)?;

    let cell = |v: f64| if v.is_nan() { String::new() } else { format!("{v:.6}") };
    for (i, bar) in frame.bars().iter().enumerate() {
        let mut record = vec![
            bar.timestamp.to_rfc3339(),
            cell(bar.open),
            cell(bar.high),
            cell(bar.low),
            cell(bar.close),
            cell(bar.volume),
        ];
        for name in &derived {
            let value = frame.column(name).and_then(|c| c.get(i)).copied().unwrap_or(f64::NAN);
            record.push(cell(value));
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(frame.len())
}

fn print_summary(s: &StateSummary) {
    println!();
    println!("=== {} ===", s.symbol);
    if s.used_fallback {
        println!("Active Symbol:  {} (fallback)", s.active_symbol);
        if let Some(reason) = &s.fallback_reason {
            println!("Reason:         {reason}");
        }
    } else {
        println!("Active Symbol:  {}", s.active_symbol);
    }
    println!("Rows:           {} hourly, {} daily", s.hourly_rows, s.daily_rows);
    println!("Last Refresh:   {}", s.last_refresh.format("%Y-%m-%d %H:%M UTC"));
    println!();
    println!("Heat Score:     {:.1} ({})", s.score, s.label);
    println!("Regime:         {}", s.regime);
    if s.risk_flags.is_empty() {
        println!("Risk Flags:     none");
    } else {
        println!("Risk Flags:     {}", s.risk_flags.join(", "));
    }
    println!(
        "Action:         {} ({:?}x) → {} {:.2}",
        s.action, s.multiplier, s.currency, s.suggested_amount
    );
    println!();
}
