//! Structural-reversal detectors: the market-context collaborator for exits.
//!
//! The driver feeds every accepted bar to `observe`, open position or not, and
//! asks `is_reversal` only while a position is open.

use crate::config::ReversalConfig;
use crate::domain::{Bar, Direction};

pub trait ReversalDetector: Send + Sync {
    /// Update internal state with a new bar. Called once per bar, before
    /// `is_reversal` for that bar.
    fn observe(&mut self, _bar: &Bar) {}

    /// True if `bar` signals a structural reversal against `direction`.
    fn is_reversal(&self, direction: Direction, bar: &Bar) -> bool;

    /// Detector name for logging.
    fn name(&self) -> &str;
}

/// Never signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReversal;

impl ReversalDetector for NoReversal {
    fn is_reversal(&self, _direction: Direction, _bar: &Bar) -> bool {
        false
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// A wide bar closing hard against the position.
#[derive(Debug, Clone)]
pub struct MomentumReversal {
    /// Minimum body / range.
    pub min_body_ratio: f64,
    /// Minimum high - low, in points.
    pub min_range_points: f64,
}

impl MomentumReversal {
    pub fn new(min_body_ratio: f64, min_range_points: f64) -> Self {
        Self {
            min_body_ratio,
            min_range_points,
        }
    }
}

impl ReversalDetector for MomentumReversal {
    fn is_reversal(&self, direction: Direction, bar: &Bar) -> bool {
        let range = bar.range();
        if range <= 0.0 {
            return false;
        }
        let against = match direction {
            Direction::Long => bar.close < bar.open,
            Direction::Short => bar.close > bar.open,
        };
        against && bar.body() / range > self.min_body_ratio && range > self.min_range_points
    }

    fn name(&self) -> &str {
        "momentum"
    }
}

/// Close crossing an EMA against the position.
///
/// EMA is seeded with the SMA of the first `period` closes, then
/// `ema = alpha * close + (1 - alpha) * ema` with `alpha = 2 / (period + 1)`.
#[derive(Debug, Clone)]
pub struct EmaCrossReversal {
    period: usize,
    alpha: f64,
    seed_sum: f64,
    seen: usize,
    ema: Option<f64>,
    prev_close: Option<f64>,
    last_close: Option<f64>,
}

impl EmaCrossReversal {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            seen: 0,
            ema: None,
            prev_close: None,
            last_close: None,
        }
    }

    pub fn ema(&self) -> Option<f64> {
        self.ema
    }
}

impl ReversalDetector for EmaCrossReversal {
    fn observe(&mut self, bar: &Bar) {
        self.prev_close = self.last_close;
        self.last_close = Some(bar.close);
        self.seen += 1;
        match self.ema {
            Some(prev) => self.ema = Some(self.alpha * bar.close + (1.0 - self.alpha) * prev),
            None => {
                self.seed_sum += bar.close;
                if self.seen >= self.period {
                    self.ema = Some(self.seed_sum / self.period as f64);
                }
            }
        }
    }

    fn is_reversal(&self, direction: Direction, bar: &Bar) -> bool {
        let (Some(ema), Some(prev)) = (self.ema, self.prev_close) else {
            return false;
        };
        match direction {
            Direction::Long => bar.close < ema && prev > ema,
            Direction::Short => bar.close > ema && prev < ema,
        }
    }

    fn name(&self) -> &str {
        "ema_cross"
    }
}

/// Signals when any inner detector does.
pub struct AnyReversal {
    detectors: Vec<Box<dyn ReversalDetector>>,
}

impl AnyReversal {
    pub fn new(detectors: Vec<Box<dyn ReversalDetector>>) -> Self {
        Self { detectors }
    }
}

impl ReversalDetector for AnyReversal {
    fn observe(&mut self, bar: &Bar) {
        for d in &mut self.detectors {
            d.observe(bar);
        }
    }

    fn is_reversal(&self, direction: Direction, bar: &Bar) -> bool {
        self.detectors
            .iter()
            .any(|d| d.is_reversal(direction, bar))
    }

    fn name(&self) -> &str {
        "any"
    }
}

/// Build the detector named by the configuration.
pub fn build_reversal_detector(config: &ReversalConfig) -> Box<dyn ReversalDetector> {
    match *config {
        ReversalConfig::None => Box::new(NoReversal),
        ReversalConfig::Momentum {
            min_body_ratio,
            min_range_points,
        } => Box::new(MomentumReversal::new(min_body_ratio, min_range_points)),
        ReversalConfig::EmaCross { period } => Box::new(EmaCrossReversal::new(period)),
        ReversalConfig::Structure {
            min_body_ratio,
            min_range_points,
            period,
        } => Box::new(AnyReversal::new(vec![
            Box::new(MomentumReversal::new(min_body_ratio, min_range_points)),
            Box::new(EmaCrossReversal::new(period)),
        ])),
    }
}
