//! TradeGate Runner — backtest orchestration, metrics, artifacts, signal files.
//!
//! This crate builds on `tradegate-core` to provide:
//! - TOML config loading with `TRADEGATE_*` environment overrides
//! - CSV bar and JSONL setup loading, plus seeded synthetic data
//! - Single-backtest runner with action log, trade extraction and metrics
//! - Breakdowns by direction and day, equity curve, confidence calibration
//! - JSON/CSV/Markdown artifact export
//! - Versioned signal-file writer for the execution platform

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod signals;

pub use config::{load_config, BacktestConfig, ConfigError, RunId};
pub use data_loader::{
    generate_synthetic_bars, generate_synthetic_setups, load_bars_csv, load_setups_jsonl,
    LoadError,
};
pub use export::{export_equity_csv, export_json, import_json, load_artifacts, save_artifacts};
pub use metrics::{
    CalibrationVerdict, ConfidenceBucket, ConfidenceCalibration, EquityPoint, GroupStats,
    PerformanceMetrics,
};
pub use runner::{
    run_backtest, run_backtest_from_files, write_signals, BacktestResult, RunError, SignalReport,
};
pub use signals::{read_signals, SignalFileError, SignalRow, SignalSchema, SignalWriter};
