//! TradeGate CLI — backtest, config check, and signal export commands.
//!
//! Commands:
//! - `backtest`: replay CSV bars and JSONL setups (or seeded synthetic data) through the engine
//! - `check-config`: load a TOML config with environment overrides and validate it
//! - `signals`: validate and grade setups, appending tradeable ones to a signal file

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tradegate_runner::data_loader::{generate_synthetic_bars, generate_synthetic_setups};
use tradegate_runner::{
    load_bars_csv, load_config, load_setups_jsonl, run_backtest, save_artifacts, write_signals,
    BacktestConfig, BacktestResult, SignalSchema, SignalWriter,
};

/// Synthetic replays start on this session open.
const SYNTHETIC_START: (i32, u32, u32) = (2024, 1, 2);
const SYNTHETIC_START_PRICE: f64 = 15_000.0;
const SYNTHETIC_SETUP_EVERY: usize = 30;
const SYNTHETIC_RISK_POINTS: f64 = 20.0;
const SYNTHETIC_R_MULTIPLE: f64 = 4.0;

#[derive(Parser)]
#[command(
    name = "tradegate",
    about = "TradeGate CLI — setup gating and position lifecycle engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay bars and setups through the lifecycle driver.
    Backtest {
        /// CSV bars with a DateTime,Open,High,Low,Close[,Volume] header.
        #[arg(long)]
        bars: Option<PathBuf>,

        /// JSONL setups, one per line.
        #[arg(long)]
        setups: Option<PathBuf>,

        /// Path to a TOML config file. Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Generate this many synthetic one-minute bars instead of reading --bars.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Seed for synthetic data.
        #[arg(long, default_value = "tradegate")]
        seed: String,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the summary only; write no artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// Load and validate a config, printing the effective values.
    CheckConfig {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Append tradeable setups to a signal file.
    Signals {
        /// JSONL setups, one per line.
        #[arg(long)]
        setups: PathBuf,

        /// Signal file to create or append to.
        #[arg(long)]
        out: PathBuf,

        /// Column layout: v1 (Target) or v2 (Take_Profit).
        #[arg(long, default_value = "v1")]
        schema: SignalSchema,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            bars,
            setups,
            config,
            synthetic,
            seed,
            output_dir,
            no_save,
        } => run_backtest_cmd(
            bars.as_deref(),
            setups.as_deref(),
            config.as_deref(),
            synthetic,
            &seed,
            &output_dir,
            no_save,
        ),
        Commands::CheckConfig { config } => run_check_config(config.as_deref()),
        Commands::Signals {
            setups,
            out,
            schema,
            config,
        } => run_signals(&setups, &out, schema, config.as_deref()),
    }
}

/// Logs go to stderr so summaries on stdout stay clean. `RUST_LOG` overrides.
fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tradegate_core=warn".parse()?)
                .add_directive("tradegate_runner=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run_backtest_cmd(
    bars: Option<&Path>,
    setups: Option<&Path>,
    config: Option<&Path>,
    synthetic: Option<usize>,
    seed: &str,
    output_dir: &Path,
    no_save: bool,
) -> Result<()> {
    let config = load_config(config).context("failed to load config")?;

    let result = match synthetic {
        Some(count) => {
            if bars.is_some() {
                bail!("--bars and --synthetic are mutually exclusive");
            }
            let start = NaiveDate::from_ymd_opt(
                SYNTHETIC_START.0,
                SYNTHETIC_START.1,
                SYNTHETIC_START.2,
            )
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .context("invalid synthetic start")?;
            tracing::info!(count, seed, "generating synthetic bars");
            let bars = generate_synthetic_bars(seed, start, count, SYNTHETIC_START_PRICE);
            let setups = match setups {
                Some(path) => load_setups_jsonl(path)?,
                None => generate_synthetic_setups(
                    seed,
                    &bars,
                    SYNTHETIC_SETUP_EVERY,
                    SYNTHETIC_RISK_POINTS,
                    SYNTHETIC_R_MULTIPLE,
                ),
            };
            let mut result = run_backtest(&config, bars, setups)?;
            result.has_synthetic = true;
            result
        }
        None => {
            let (Some(bars), Some(setups)) = (bars, setups) else {
                bail!("--bars and --setups are required unless --synthetic is given");
            };
            run_backtest(&config, load_bars_csv(bars)?, load_setups_jsonl(setups)?)?
        }
    };

    print_summary(&result);

    if !no_save {
        let run_dir = save_artifacts(&result, output_dir)?;
        println!();
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn run_check_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path).context("config is invalid")?;
    print_config(&config)?;
    println!();
    println!("Config OK (run id {})", config.run_id());
    Ok(())
}

fn run_signals(
    setups: &Path,
    out: &Path,
    schema: SignalSchema,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_config(config).context("failed to load config")?;
    let setups = load_setups_jsonl(setups)?;
    let mut writer = SignalWriter::open(out, schema)?;
    let report = write_signals(&config, &setups, &mut writer)?;

    println!("Setups:   {}", setups.len());
    println!("Written:  {}", report.written);
    println!("Invalid:  {}", report.invalid);
    println!("Filtered: {}", report.filtered);
    println!("Signal file: {}", out.display());
    Ok(())
}

fn print_config(config: &BacktestConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render config")?;
    println!("{rendered}");
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Name:           {}", result.name);
    println!("Run ID:         {}", &result.run_id[..16]);
    if let (Some(start), Some(end)) = (result.start, result.end) {
        println!("Period:         {start} to {end}");
    }
    println!("Bars:           {}", result.bar_count);
    println!(
        "Setups:         {} ({} rejected)",
        result.setup_count, result.rejected_count
    );
    println!(
        "Trades:         {} ({}W / {}L / {}BE)",
        m.trade_count, m.wins, m.losses, m.breakevens
    );
    println!();
    println!("--- Performance ---");
    println!("Total P&L:      {:.2} pts", m.total_pnl_points);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Expectancy:     {:.2} pts", m.expectancy_points);
    println!("Avg R:          {:.2}", m.avg_r_multiple);
    println!("Max Drawdown:   {:.2} pts", m.max_drawdown_points);
    println!("Max Consec Win: {}", m.max_consecutive_wins);
    println!("Max Consec Loss:{}", m.max_consecutive_losses);
    if !m.by_setup_type.is_empty() {
        println!();
        println!("--- By Setup Type ---");
        for (name, g) in &m.by_setup_type {
            println!(
                "{name:<16}{:>4} trades  {:>5.1}%  {:>9.2} pts",
                g.trades,
                g.win_rate * 100.0,
                g.total_pnl_points
            );
        }
    }
    println!();
    println!("--- By Direction ---");
    for (direction, g) in &m.by_direction {
        println!(
            "{direction:<16}{:>4} trades  {:>5.1}%  {:>9.2} pts",
            g.trades,
            g.win_rate * 100.0,
            g.total_pnl_points
        );
    }
    println!("Trading days:   {}", m.by_day.len());
    println!(
        "Confidence:     {} ({} trades)",
        m.confidence_calibration.verdict(),
        m.confidence_calibration.total_trades()
    );
    println!();
    println!(
        "Risk state:     {:?}, {} consecutive losses",
        result.risk_state.lifecycle, result.risk_state.consecutive_losses
    );
    if let Some(p) = &result.open_position {
        println!(
            "Open position:  {} x{} @ {:.2} (stop {:.2})",
            p.direction, p.remaining_quantity, p.entry_price, p.stop_price
        );
    }
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    for err in &result.data_errors {
        println!("WARNING: {err}");
    }
}
