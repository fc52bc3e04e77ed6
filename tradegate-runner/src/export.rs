//! Reporting and export: JSON, CSV, and Markdown artifacts.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade tape, action log and equity curve for external analysis tools
//! - **Markdown**: human-readable single-run report
//!
//! All persisted artifacts include a `schema_version` field. Unknown versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tradegate_core::domain::{Action, TradeRecord};
use tradegate_core::engine::LoggedAction;

use crate::metrics::EquityPoint;
use crate::runner::{BacktestResult, SCHEMA_VERSION};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export closed trades, one row per trade.
///
/// Columns: direction, grade, setup_type, confidence, entry_time, entry_price,
/// initial_stop, target_price, quantity, exit_time, avg_exit_price,
/// exit_reason, legs, pnl_points, points_per_contract, result, r_multiple,
/// bars_held, mae, mfe
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "direction",
        "grade",
        "setup_type",
        "confidence",
        "entry_time",
        "entry_price",
        "initial_stop",
        "target_price",
        "quantity",
        "exit_time",
        "avg_exit_price",
        "exit_reason",
        "legs",
        "pnl_points",
        "points_per_contract",
        "result",
        "r_multiple",
        "bars_held",
        "mae",
        "mfe",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.direction.to_string(),
            &t.grade.to_string(),
            t.setup_type.as_deref().unwrap_or(""),
            &format!("{:.2}", t.confidence),
            &t.entry_time.format(TIME_FORMAT).to_string(),
            &format!("{:.2}", t.entry_price),
            &format!("{:.2}", t.initial_stop),
            &format!("{:.2}", t.target_price),
            &t.quantity.to_string(),
            &t.exit_time.format(TIME_FORMAT).to_string(),
            &format!("{:.2}", t.avg_exit_price()),
            &t.exit_reason.to_string(),
            &t.legs.len().to_string(),
            &format!("{:.2}", t.realized_pnl_points),
            &format!("{:.2}", t.points_per_contract),
            &format!("{:?}", t.result),
            &format!("{:.3}", t.r_multiple_achieved),
            &t.bars_held.to_string(),
            &format!("{:.2}", t.mae_points),
            &format!("{:.2}", t.mfe_points),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the action log with a flat `detail` column per action type.
pub fn export_actions_csv(actions: &[LoggedAction]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "action", "quantity", "price", "detail"])?;
    for entry in actions {
        let (quantity, price, detail) = match &entry.action {
            Action::Enter {
                direction,
                stop_price,
                target_price,
                quantity,
                entry_price,
                grade,
            } => (
                quantity.to_string(),
                format!("{entry_price:.2}"),
                format!("{direction} grade={grade} stop={stop_price:.2} target={target_price:.2}"),
            ),
            Action::ScaleExit {
                leg,
                quantity,
                price,
            } => (quantity.to_string(), format!("{price:.2}"), format!("{leg:?}")),
            Action::MoveStop { kind, price } => {
                (String::new(), format!("{price:.2}"), format!("{kind:?}"))
            }
            Action::Close {
                reason,
                quantity,
                price,
            } => (quantity.to_string(), format!("{price:.2}"), reason.to_string()),
            Action::Rejected { rejection } => (String::new(), String::new(), rejection.to_string()),
        };
        wtr.write_record([
            entry.timestamp.format(TIME_FORMAT).to_string(),
            entry.action.name().to_string(),
            quantity,
            price,
            detail,
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the cumulative P&L curve, one row per closed trade.
pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "pnl_points", "equity_points"])?;
    for p in curve {
        wtr.write_record([
            p.timestamp.format(TIME_FORMAT).to_string(),
            format!("{:.2}", p.pnl_points),
            format!("{:.2}", p.equity_points),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates a directory named `{name}_{timestamp}/` under `output_dir`
/// containing:
/// - `manifest.json`: the full `BacktestResult`
/// - `trades.csv`: closed-trade tape
/// - `actions.csv`: every emitted action, rejections included
/// - `equity_curve.csv`: cumulative P&L after each trade
/// - `report.md`: Markdown summary
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        result.name,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let write = |file: &str, content: String| {
        let path = run_dir.join(file);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))
    };
    write("manifest.json", export_json(result)?)?;
    write("trades.csv", export_trades_csv(&result.trades)?)?;
    write("actions.csv", export_actions_csv(&result.actions)?)?;
    write(
        "equity_curve.csv",
        export_equity_csv(&result.metrics.equity_curve)?,
    )?;
    write("report.md", generate_report(result))?;

    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);
    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Name | {} |\n", result.name));
    md.push_str(&format!("| Run ID | {} |\n", result.run_id));
    if let (Some(start), Some(end)) = (result.start, result.end) {
        md.push_str(&format!("| Period | {start} to {end} |\n"));
    }
    md.push_str(&format!("| Bars | {} |\n", result.bar_count));
    md.push_str(&format!(
        "| Setups | {} ({} rejected) |\n",
        result.setup_count, result.rejected_count
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    if result.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    let m = &result.metrics;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Trades | {} ({}W / {}L / {}BE) |\n",
        m.trade_count, m.wins, m.losses, m.breakevens
    ));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Total P&L | {:.2} pts |\n", m.total_pnl_points));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", m.profit_factor));
    md.push_str(&format!("| Expectancy | {:.2} pts |\n", m.expectancy_points));
    md.push_str(&format!("| Avg Win | {:.2} pts |\n", m.avg_win_points));
    md.push_str(&format!("| Avg Loss | {:.2} pts |\n", m.avg_loss_points));
    md.push_str(&format!("| Largest Win | {:.2} pts |\n", m.largest_win_points));
    md.push_str(&format!("| Largest Loss | {:.2} pts |\n", m.largest_loss_points));
    md.push_str(&format!("| Avg R | {:.2} |\n", m.avg_r_multiple));
    md.push_str(&format!("| Avg Bars Held | {:.1} |\n", m.avg_bars_held));
    md.push_str(&format!("| Max Drawdown | {:.2} pts |\n", m.max_drawdown_points));
    md.push_str(&format!(
        "| Max Consecutive Wins / Losses | {} / {} |\n",
        m.max_consecutive_wins, m.max_consecutive_losses
    ));
    md.push('\n');

    if !m.by_setup_type.is_empty() {
        md.push_str("## By Setup Type\n\n");
        md.push_str("| Setup | Trades | Win Rate | P&L |\n");
        md.push_str("| --- | ---: | ---: | ---: |\n");
        for (name, g) in &m.by_setup_type {
            md.push_str(&format!(
                "| {name} | {} | {:.1}% | {:.2} |\n",
                g.trades,
                g.win_rate * 100.0,
                g.total_pnl_points
            ));
        }
        md.push('\n');
    }

    md.push_str("## By Direction\n\n");
    md.push_str("| Direction | Trades | Win Rate | P&L |\n");
    md.push_str("| --- | ---: | ---: | ---: |\n");
    for (direction, g) in &m.by_direction {
        md.push_str(&format!(
            "| {direction} | {} | {:.1}% | {:.2} |\n",
            g.trades,
            g.win_rate * 100.0,
            g.total_pnl_points
        ));
    }
    md.push('\n');

    if !m.by_day.is_empty() {
        md.push_str("## Daily\n\n");
        md.push_str("| Date | Trades | W / L | Win Rate | P&L |\n");
        md.push_str("| --- | ---: | ---: | ---: | ---: |\n");
        for (day, g) in &m.by_day {
            md.push_str(&format!(
                "| {day} | {} | {} / {} | {:.1}% | {:.2} |\n",
                g.trades,
                g.wins,
                g.losses,
                g.win_rate * 100.0,
                g.total_pnl_points
            ));
        }
        md.push('\n');
    }

    if !m.equity_curve.is_empty() {
        md.push_str("## Equity Curve\n\n");
        md.push_str("| Exit | P&L | Equity |\n");
        md.push_str("| --- | ---: | ---: |\n");
        for p in &m.equity_curve {
            md.push_str(&format!(
                "| {} | {:.2} | {:.2} |\n",
                p.timestamp.format(TIME_FORMAT),
                p.pnl_points,
                p.equity_points
            ));
        }
        md.push('\n');
    }

    let c = &m.confidence_calibration;
    md.push_str("## Confidence Calibration\n\n");
    md.push_str("| Confidence | Range | Trades | Win Rate |\n");
    md.push_str("| --- | --- | ---: | ---: |\n");
    for b in &c.buckets {
        let (low, high) = b.bucket.range();
        md.push_str(&format!(
            "| {} | {:.0}-{:.0}% | {} | {:.1}% |\n",
            b.bucket,
            low * 100.0,
            high * 100.0,
            b.stats.trades,
            b.stats.win_rate * 100.0
        ));
    }
    md.push_str(&format!("\nVerdict: {}\n\n", c.verdict()));

    md.push_str("## Risk State at End\n\n");
    let r = &result.risk_state;
    md.push_str(&format!("- Lifecycle: {:?}\n", r.lifecycle));
    md.push_str(&format!("- Trades today: {}\n", r.trades_opened_today));
    md.push_str(&format!("- Day P&L: {:.2} pts\n", r.cumulative_pnl_points));
    md.push_str(&format!("- Consecutive losses: {}\n", r.consecutive_losses));
    if let Some(p) = &result.open_position {
        md.push_str(&format!(
            "- Open position: {} {} @ {:.2}, stop {:.2}\n",
            p.direction, p.remaining_quantity, p.entry_price, p.stop_price
        ));
    }
    md.push('\n');

    if !result.data_errors.is_empty() {
        md.push_str("## Data Quality\n\n");
        for e in &result.data_errors {
            md.push_str(&format!("- {e}\n"));
        }
        md.push('\n');
    }

    md
}
