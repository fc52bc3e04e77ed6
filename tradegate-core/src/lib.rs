//! TradeGate Core — setup validation, edge scoring, risk gating, sizing and
//! exit management for a single-instrument intraday trading loop.
//!
//! This crate holds every decision the pipeline makes:
//! - Domain types (bars, setups, grades, trades, actions)
//! - Stateless setup validator and edge scorer
//! - Daily risk ledger with NORMAL / WARNING / COOLDOWN / HALTED states
//! - Grade-driven position sizer
//! - Per-position exit state machine (scaled exits, breakeven, trailing)
//! - Lifecycle driver and event sources shared by backtest and live modes
//!
//! No I/O happens here. Loading data, persisting artifacts and writing signal
//! files live in `tradegate-runner`.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exits;
pub mod risk;
pub mod scorer;
pub mod sizer;
pub mod validator;
