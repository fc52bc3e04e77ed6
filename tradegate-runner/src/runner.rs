//! Backtest runner: wires config, data, the lifecycle driver and metrics.
//!
//! Entry points:
//! - `run_backtest()`: pre-loaded bars and setups, no I/O.
//! - `run_backtest_from_files()`: loads CSV bars and JSONL setups, then runs.
//! - `write_signals()`: validates and grades setups, writing accepted ones to a signal file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradegate_core::domain::{Action, Bar, Recommendation, Setup, TradeRecord};
use tradegate_core::engine::{run_events, LifecycleDriver, LoggedAction, ReplaySource};
use tradegate_core::error::InvariantViolation;
use tradegate_core::exits::Position;
use tradegate_core::risk::DailyRiskState;
use tradegate_core::scorer::EdgeScorer;
use tradegate_core::validator::SetupValidator;

use crate::config::{BacktestConfig, ConfigError, RunId};
use crate::data_loader::{load_bars_csv, load_setups_jsonl, LoadError};
use crate::metrics::PerformanceMetrics;
use crate::signals::{SignalFileError, SignalWriter};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("signal file error: {0}")]
    Signal(#[from] SignalFileError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub name: String,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<TradeRecord>,
    /// Every action the driver emitted, rejections included.
    pub actions: Vec<LoggedAction>,
    /// Risk ledger after the last event.
    pub risk_state: DailyRiskState,
    /// Position still open when the data ran out.
    pub open_position: Option<Position>,
    pub config: BacktestConfig,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub bar_count: usize,
    pub setup_count: usize,
    pub rejected_count: usize,
    pub data_errors: Vec<String>,
    pub start: Option<chrono::NaiveDateTime>,
    pub end: Option<chrono::NaiveDateTime>,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    /// Logged actions the execution collaborator would have acted on.
    pub fn executable_actions(&self) -> impl Iterator<Item = &LoggedAction> {
        self.actions.iter().filter(|a| a.action.is_executable())
    }
}

/// Hash of the input bars and setups, so artifacts can be matched to data.
pub fn dataset_hash(bars: &[Bar], setups: &[Setup]) -> String {
    let mut hasher = blake3::Hasher::new();
    // Plain data: serialization is infallible.
    hasher.update(&serde_json::to_vec(bars).unwrap_or_default());
    hasher.update(&serde_json::to_vec(setups).unwrap_or_default());
    hasher.finalize().to_hex().to_string()
}

/// Run a backtest over pre-loaded data. No I/O.
pub fn run_backtest(
    config: &BacktestConfig,
    bars: Vec<Bar>,
    setups: Vec<Setup>,
) -> Result<BacktestResult, RunError> {
    let run_id = config.run_id();
    let mut driver =
        LifecycleDriver::new(config.engine.clone()).map_err(ConfigError::from)?;

    let dataset_hash = dataset_hash(&bars, &setups);
    let (bar_count, setup_count) = (bars.len(), setups.len());
    let start = bars.first().map(|b| b.timestamp);
    let end = bars.last().map(|b| b.timestamp);

    tracing::info!(
        run_id = %&run_id[..12],
        bars = bar_count,
        setups = setup_count,
        reversal = driver.reversal_detector(),
        "starting backtest"
    );

    let mut source = ReplaySource::new(bars, setups);
    let log = run_events(&mut driver, &mut source)?;

    let trades = driver.take_closed_trades();
    let metrics = PerformanceMetrics::compute(&trades);
    let rejected_count = log
        .entries
        .iter()
        .filter(|e| matches!(e.action, Action::Rejected { .. }))
        .count();
    let data_errors: Vec<String> = driver.data_errors().iter().map(|e| e.to_string()).collect();
    if !data_errors.is_empty() {
        tracing::warn!(count = data_errors.len(), "events skipped as data errors");
    }
    let open_position = driver.position().cloned();

    tracing::info!(
        trades = metrics.trade_count,
        win_rate = metrics.win_rate,
        pnl_points = metrics.total_pnl_points,
        rejected = rejected_count,
        "backtest finished"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        name: config.name.clone(),
        metrics,
        trades,
        actions: log.entries,
        risk_state: driver.risk_state().clone(),
        open_position,
        config: config.clone(),
        dataset_hash,
        has_synthetic: false,
        bar_count,
        setup_count,
        rejected_count,
        data_errors,
        start,
        end,
    })
}

/// Load bars and setups from disk, then run.
pub fn run_backtest_from_files(
    config: &BacktestConfig,
    bars_path: &Path,
    setups_path: &Path,
) -> Result<BacktestResult, RunError> {
    let bars = load_bars_csv(bars_path)?;
    let setups = load_setups_jsonl(setups_path)?;
    run_backtest(config, bars, setups)
}

/// Outcome of a signal export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    pub written: usize,
    pub invalid: usize,
    pub filtered: usize,
}

/// Validate and grade each setup on its own and write the tradeable ones.
///
/// No market price or risk ledger is involved: the deviation check is
/// skipped and grades below the configured recommendation floor are dropped.
pub fn write_signals(
    config: &BacktestConfig,
    setups: &[Setup],
    writer: &mut SignalWriter,
) -> Result<SignalReport, RunError> {
    let validator = SetupValidator::new(config.engine.validator.clone());
    let scorer = EdgeScorer::new(config.engine.scorer.clone());
    let mut report = SignalReport::default();

    for setup in setups {
        let valid = match validator.validate(setup, None) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(created_at = %setup.created_at, error = %e, "setup rejected");
                report.invalid += 1;
                continue;
            }
        };
        let edge = scorer.score_setup(setup);
        let tradeable = match edge.recommendation {
            Recommendation::Take => true,
            Recommendation::Wait => config.engine.lifecycle.accept_wait_grades,
            Recommendation::Skip => false,
        };
        if !tradeable {
            tracing::debug!(created_at = %setup.created_at, grade = %edge.grade, "setup filtered");
            report.filtered += 1;
            continue;
        }
        writer.write_setup(&valid)?;
        report.written += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::{generate_synthetic_bars, generate_synthetic_setups};
    use chrono::{NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn synthetic(seed: &str) -> (Vec<Bar>, Vec<Setup>) {
        let bars = generate_synthetic_bars(seed, start(), 600, 15000.0);
        let setups = generate_synthetic_setups(seed, &bars, 20, 20.0, 4.0);
        (bars, setups)
    }

    #[test]
    fn synthetic_backtest_is_deterministic() {
        let config = BacktestConfig::default();
        let (bars, setups) = synthetic("det");
        let a = run_backtest(&config, bars.clone(), setups.clone()).unwrap();
        let b = run_backtest(&config, bars, setups).unwrap();
        assert_eq!(a.run_id, b.run_id);
        assert_eq!(a.dataset_hash, b.dataset_hash);
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.bar_count, 600);
    }

    #[test]
    fn result_counts_are_consistent() {
        let (bars, setups) = synthetic("counts");
        let n_setups = setups.len();
        let r = run_backtest(&BacktestConfig::default(), bars, setups).unwrap();
        let enters = r
            .actions
            .iter()
            .filter(|a| matches!(a.action, Action::Enter { .. }))
            .count();
        // Every setup becomes exactly one ENTER or one REJECTED.
        assert_eq!(enters + r.rejected_count, n_setups);
        assert_eq!(enters, r.trades.len() + r.open_position.iter().count());
        assert_eq!(r.metrics.trade_count, r.trades.len());
        assert!(r.data_errors.is_empty());
        assert_eq!(r.executable_actions().count(), r.actions.len() - r.rejected_count);
    }

    #[test]
    fn invalid_config_is_a_config_error() {
        let mut config = BacktestConfig::default();
        config.engine.validator.min_stop_points = 60.0;
        let err = run_backtest(&config, vec![], vec![]).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn empty_inputs_give_empty_result() {
        let r = run_backtest(&BacktestConfig::default(), vec![], vec![]).unwrap();
        assert!(r.trades.is_empty());
        assert!(r.actions.is_empty());
        assert_eq!(r.start, None);
        assert_eq!(r.metrics, PerformanceMetrics::compute(&[]));
    }
}
