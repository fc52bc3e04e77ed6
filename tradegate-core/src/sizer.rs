//! Position sizer: turns a grade and risk caps into a contract count.

use serde::{Deserialize, Serialize};

use crate::config::SizingConfig;
use crate::domain::Grade;
use crate::risk::SizeHint;

/// Account-level caps for one sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskCaps {
    pub base_quantity: u32,
    pub max_position_size: u32,
    /// Optional cap on quantity × stop distance, in points.
    pub max_risk_points: Option<f64>,
    /// Reduction from the risk gate (1.0 = none).
    pub size_factor: f64,
}

impl RiskCaps {
    pub fn new(config: &SizingConfig, hint: SizeHint) -> Self {
        Self {
            base_quantity: config.base_quantity,
            max_position_size: config.max_position_size,
            max_risk_points: config.max_risk_points_per_trade,
            size_factor: hint.factor,
        }
    }
}

/// Contract-quantity sizing.
///
/// # Responsibilities
/// - Scale the base quantity by the grade multiplier and the gate's size hint
/// - Clamp to `[1, max_position_size]`
/// - Respect the optional per-trade risk budget
///
/// # Non-Responsibilities
/// - Does NOT decide whether to trade (that's the risk gate's job)
/// - Does NOT look at market prices beyond the stop distance
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionSizer;

impl PositionSizer {
    /// Quantity for a trade. Zero means "do not trade".
    pub fn size(&self, grade: Grade, caps: &RiskCaps, stop_distance: f64) -> u32 {
        let multiplier = grade.size_multiplier();
        if multiplier <= 0.0 || caps.max_position_size == 0 {
            return 0;
        }

        let raw = (caps.base_quantity as f64 * multiplier * caps.size_factor).floor();
        let mut quantity = if raw >= 1.0 { raw as u32 } else { 1 };
        quantity = quantity.clamp(1, caps.max_position_size);

        if let Some(budget) = caps.max_risk_points {
            if !(stop_distance > 0.0) {
                return 0;
            }
            let affordable = (budget / stop_distance).floor();
            if affordable < quantity as f64 {
                quantity = affordable.max(0.0) as u32;
            }
        }
        quantity
    }

    pub fn name(&self) -> &str {
        "grade_multiplier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(base: u32, max: u32) -> RiskCaps {
        RiskCaps {
            base_quantity: base,
            max_position_size: max,
            max_risk_points: None,
            size_factor: 1.0,
        }
    }

    #[test]
    fn zero_multiplier_means_no_trade() {
        let s = PositionSizer;
        assert_eq!(s.size(Grade::D, &caps(5, 10), 20.0), 0);
        assert_eq!(s.size(Grade::F, &caps(5, 10), 20.0), 0);
    }

    #[test]
    fn multiplier_floors_with_minimum_one() {
        let s = PositionSizer;
        assert_eq!(s.size(Grade::A, &caps(1, 10), 20.0), 1);
        assert_eq!(s.size(Grade::A, &caps(2, 10), 20.0), 3);
        assert_eq!(s.size(Grade::B, &caps(3, 10), 20.0), 3);
        assert_eq!(s.size(Grade::C, &caps(1, 10), 20.0), 1);
        assert_eq!(s.size(Grade::C, &caps(5, 10), 20.0), 2);
    }

    #[test]
    fn clamped_to_max_position() {
        assert_eq!(PositionSizer.size(Grade::A, &caps(10, 10), 20.0), 10);
    }

    #[test]
    fn warning_hint_halves_size() {
        let mut c = caps(4, 10);
        c.size_factor = 0.5;
        assert_eq!(PositionSizer.size(Grade::B, &c, 20.0), 2);
        c.base_quantity = 1;
        assert_eq!(PositionSizer.size(Grade::B, &c, 20.0), 1);
    }

    #[test]
    fn risk_budget_caps_quantity() {
        let mut c = caps(4, 10);
        c.max_risk_points = Some(50.0);
        // floor(50 / 20) = 2
        assert_eq!(PositionSizer.size(Grade::B, &c, 20.0), 2);
        // floor(50 / 60) = 0: budget cannot afford one contract
        assert_eq!(PositionSizer.size(Grade::B, &c, 60.0), 0);
    }

    #[test]
    fn caps_from_config_and_hint() {
        let c = RiskCaps::new(&SizingConfig::default(), SizeHint { factor: 0.5 });
        assert_eq!(c.base_quantity, 1);
        assert_eq!(c.max_position_size, 10);
        assert_eq!(c.size_factor, 0.5);
    }
}
