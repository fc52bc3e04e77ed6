//! Error taxonomy for the engine.
//!
//! - `ValidationError`: a setup failed a geometry or sanity check. Recoverable;
//!   the setup is rejected and nothing is mutated.
//! - `DenyReason`: the risk gate refused an otherwise valid setup. Recoverable.
//! - `DataError`: a malformed or out-of-order input event. The event is skipped
//!   and engine state is unchanged.
//! - `InvariantViolation`: a broken programming contract. Fatal to the current
//!   run; never silently corrected.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the validator rejected a setup.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationError {
    #[error("geometry error: {reason}")]
    GeometryError { reason: String },

    #[error("stop distance {distance:.2} outside [{min:.2}, {max:.2}]")]
    StopOutOfRange { distance: f64, min: f64, max: f64 },

    #[error("reward/risk {r_multiple:.2} below minimum {min:.2}")]
    InsufficientRewardRisk { r_multiple: f64, min: f64 },

    #[error("entry {entry:.2} is {deviation_pct:.2}% from market {market:.2} (max {max_pct:.2}%)")]
    EntryTooFarFromMarket {
        entry: f64,
        market: f64,
        deviation_pct: f64,
        max_pct: f64,
    },

    #[error("confidence {confidence:.2} below minimum {min:.2}")]
    LowConfidence { confidence: f64, min: f64 },
}

/// Why the risk gate denied a setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    #[error("daily trade limit reached")]
    DailyTradeLimit,

    #[error("daily loss limit reached")]
    DailyLossLimit,

    #[error("consecutive-loss cooldown until {until}")]
    ConsecutiveLossCooldown { until: NaiveDateTime },

    #[error("already in a position")]
    AlreadyInPosition,

    #[error("trading halted by operator")]
    OperatorHalt,
}

/// A malformed or out-of-order input event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("malformed bar at {timestamp}: {detail}")]
    MalformedBar {
        timestamp: NaiveDateTime,
        detail: String,
    },

    #[error("out-of-order event at {timestamp} (last seen {last})")]
    OutOfOrder {
        timestamp: NaiveDateTime,
        last: NaiveDateTime,
    },
}

/// A programming-contract breach. Aborts the current run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("exit of {requested} contracts exceeds remaining quantity {remaining}")]
    QuantityUnderflow { remaining: u32, requested: u32 },

    #[error("stop moved against the position: {from:.2} -> {to:.2}")]
    StopLoosened { from: f64, to: f64 },

    #[error("closed legs sum to {closed} contracts, position opened with {original}")]
    QuantityMismatch { original: u32, closed: u32 },

    #[error("operation on a closed position")]
    PositionClosed,

    #[error("cannot open a position with zero quantity")]
    ZeroQuantity,

    #[error("position opened while another is still open")]
    PositionAlreadyOpen,
}
