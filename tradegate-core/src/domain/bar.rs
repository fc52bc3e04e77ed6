//! Bar: the unit of replay for both live and backtest drivers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV bar for the traded instrument.
///
/// Timestamps are exchange-local wall time. All engine time is taken from
/// here; the engine never reads a clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: u64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, low <= open/close,
    /// all prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
    }

    /// Full bar range (high - low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Absolute body size |close - open|.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
}
