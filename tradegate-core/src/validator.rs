//! Setup validator: stateless geometry and sanity checks.
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//! 1. Prices finite and positive, confidence in [0, 1]
//! 2. Stop/entry/target ordered for the direction
//! 3. Stop distance within the configured bounds (inclusive)
//! 4. Reward/risk at or above the configured minimum
//! 5. Entry within the configured deviation of the last known market price
//! 6. Confidence at or above the configured minimum

use crate::config::ValidatorConfig;
use crate::domain::{Direction, Setup, ValidSetup};
use crate::error::ValidationError;

/// Tolerance for R-multiple comparisons, so that an exact 3.0R passes a 3.0 minimum.
const R_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct SetupValidator {
    config: ValidatorConfig,
}

impl SetupValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a setup against the configured bounds.
    ///
    /// `market_price` is the last known traded price. When `None` (no bar seen
    /// yet) the deviation check is skipped.
    pub fn validate(
        &self,
        setup: &Setup,
        market_price: Option<f64>,
    ) -> Result<ValidSetup, ValidationError> {
        check_prices(setup)?;

        if !setup.is_ordered() {
            return Err(ValidationError::GeometryError {
                reason: format!(
                    "{} requires {}; got stop {:.2}, entry {:.2}, target {:.2}",
                    setup.direction,
                    match setup.direction {
                        Direction::Long => "stop < entry < target",
                        Direction::Short => "target < entry < stop",
                    },
                    setup.stop_price,
                    setup.entry_price,
                    setup.target_price
                ),
            });
        }

        let risk = setup.risk();
        let reward = setup.reward();
        if risk < self.config.min_stop_points || risk > self.config.max_stop_points {
            return Err(ValidationError::StopOutOfRange {
                distance: risk,
                min: self.config.min_stop_points,
                max: self.config.max_stop_points,
            });
        }

        let r_multiple = reward / risk;
        if r_multiple + R_EPSILON < self.config.min_r_multiple {
            return Err(ValidationError::InsufficientRewardRisk {
                r_multiple,
                min: self.config.min_r_multiple,
            });
        }

        if let Some(market) = market_price.filter(|m| m.is_finite() && *m > 0.0) {
            let deviation_pct = (setup.entry_price - market).abs() / market * 100.0;
            if deviation_pct > self.config.max_entry_deviation_pct {
                return Err(ValidationError::EntryTooFarFromMarket {
                    entry: setup.entry_price,
                    market,
                    deviation_pct,
                    max_pct: self.config.max_entry_deviation_pct,
                });
            }
        }

        if setup.confidence < self.config.min_confidence {
            return Err(ValidationError::LowConfidence {
                confidence: setup.confidence,
                min: self.config.min_confidence,
            });
        }

        Ok(ValidSetup::new(setup.clone(), risk, reward))
    }
}

fn check_prices(setup: &Setup) -> Result<(), ValidationError> {
    for (name, price) in [
        ("entry", setup.entry_price),
        ("stop", setup.stop_price),
        ("target", setup.target_price),
    ] {
        if !price.is_finite() || price <= 0.0 {
            return Err(ValidationError::GeometryError {
                reason: format!("{name} price {price} is not a positive number"),
            });
        }
    }
    if !(0.0..=1.0).contains(&setup.confidence) {
        return Err(ValidationError::GeometryError {
            reason: format!("confidence {} outside [0, 1]", setup.confidence),
        });
    }
    Ok(())
}
