//! Engine configuration.
//!
//! One immutable `EngineConfig` is handed to every component. Each section
//! deserializes with defaults, so a TOML file only has to name the values it
//! overrides. Call `validate()` before constructing a driver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::trade::DEFAULT_BREAKEVEN_BAND_POINTS;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub validator: ValidatorConfig,
    pub scorer: ScorerConfig,
    pub risk: RiskConfig,
    pub sizing: SizingConfig,
    pub exits: ExitConfig,
    pub lifecycle: LifecycleConfig,
}

impl EngineConfig {
    /// Check cross-field consistency of every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validator.validate()?;
        self.scorer.validate()?;
        self.risk.validate()?;
        self.sizing.validate()?;
        self.exits.validate()?;
        self.lifecycle.validate()?;
        Ok(())
    }
}

// ─── Validator ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Inclusive stop-distance bounds, in price points.
    pub min_stop_points: f64,
    pub max_stop_points: f64,
    pub min_r_multiple: f64,
    /// Maximum |entry - market| / market, in percent.
    pub max_entry_deviation_pct: f64,
    /// Setups below this confidence are rejected. 0 disables the check.
    pub min_confidence: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_stop_points: 15.0,
            max_stop_points: 50.0,
            min_r_multiple: 3.0,
            max_entry_deviation_pct: 2.0,
            min_confidence: 0.0,
        }
    }
}

impl ValidatorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_stop_points > 0.0) {
            return Err(invalid("validator.min_stop_points", "must be positive"));
        }
        if self.min_stop_points >= self.max_stop_points {
            return Err(invalid(
                "validator.max_stop_points",
                format!(
                    "must exceed min_stop_points ({} >= {})",
                    self.min_stop_points, self.max_stop_points
                ),
            ));
        }
        if !(self.min_r_multiple > 0.0) {
            return Err(invalid("validator.min_r_multiple", "must be positive"));
        }
        if !(self.max_entry_deviation_pct > 0.0) {
            return Err(invalid("validator.max_entry_deviation_pct", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("validator.min_confidence", "must be in [0, 1]"));
        }
        Ok(())
    }
}

// ─── Scorer ─────────────────────────────────────────────────────────

/// One reward/risk tier: setups with R >= `min_r` earn `points`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardRiskTier {
    pub min_r: f64,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Tiers in descending `min_r` order. The first tier is the ceiling.
    pub reward_risk_tiers: Vec<RewardRiskTier>,
    /// Points for setups below every tier.
    pub reward_risk_floor_points: u32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            reward_risk_tiers: vec![
                RewardRiskTier { min_r: 4.0, points: 25 },
                RewardRiskTier { min_r: 3.0, points: 20 },
                RewardRiskTier { min_r: 2.0, points: 12 },
            ],
            reward_risk_floor_points: 5,
        }
    }
}

impl ScorerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut prev: Option<RewardRiskTier> = None;
        for tier in &self.reward_risk_tiers {
            if tier.points > 25 {
                return Err(invalid("scorer.reward_risk_tiers", "points are capped at 25"));
            }
            if let Some(p) = prev {
                if tier.min_r >= p.min_r || tier.points > p.points {
                    return Err(invalid(
                        "scorer.reward_risk_tiers",
                        "tiers must be ordered by descending min_r and non-increasing points",
                    ));
                }
            }
            prev = Some(*tier);
        }
        if let Some(last) = prev {
            if self.reward_risk_floor_points > last.points {
                return Err(invalid(
                    "scorer.reward_risk_floor_points",
                    "must not exceed the lowest tier",
                ));
            }
        }
        if self.reward_risk_floor_points > 25 {
            return Err(invalid("scorer.reward_risk_floor_points", "capped at 25"));
        }
        Ok(())
    }
}

// ─── Risk ───────────────────────────────────────────────────────────

/// What happens to the consecutive-loss streak when the calendar date advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsecutiveLossPolicy {
    /// The streak survives the day boundary.
    #[default]
    CarryOver,
    /// The streak is zeroed with the other daily counters.
    ResetDaily,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_daily_trades: u32,
    /// Daily loss cap in points (positive number).
    pub max_daily_loss_points: f64,
    pub max_consecutive_losses: u32,
    pub cooldown_minutes: i64,
    /// Fraction of the loss cap at which WARNING begins.
    pub warning_loss_fraction: f64,
    /// Size hint applied while in WARNING.
    pub warning_size_factor: f64,
    pub consecutive_loss_policy: ConsecutiveLossPolicy,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_trades: 5,
            max_daily_loss_points: 100.0,
            max_consecutive_losses: 3,
            cooldown_minutes: 15,
            warning_loss_fraction: 0.8,
            warning_size_factor: 0.5,
            consecutive_loss_policy: ConsecutiveLossPolicy::CarryOver,
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_daily_trades == 0 {
            return Err(invalid("risk.max_daily_trades", "must be at least 1"));
        }
        if !(self.max_daily_loss_points > 0.0) {
            return Err(invalid("risk.max_daily_loss_points", "must be positive"));
        }
        if self.max_consecutive_losses == 0 {
            return Err(invalid("risk.max_consecutive_losses", "must be at least 1"));
        }
        if self.cooldown_minutes < 0 {
            return Err(invalid("risk.cooldown_minutes", "must not be negative"));
        }
        if !(self.warning_loss_fraction > 0.0 && self.warning_loss_fraction <= 1.0) {
            return Err(invalid("risk.warning_loss_fraction", "must be in (0, 1]"));
        }
        if !(self.warning_size_factor > 0.0 && self.warning_size_factor <= 1.0) {
            return Err(invalid("risk.warning_size_factor", "must be in (0, 1]"));
        }
        Ok(())
    }
}

// ─── Sizing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub base_quantity: u32,
    pub max_position_size: u32,
    /// Optional cap on quantity × stop distance, in points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_risk_points_per_trade: Option<f64>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_quantity: 1,
            max_position_size: 10,
            max_risk_points_per_trade: None,
        }
    }
}

impl SizingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.base_quantity == 0 {
            return Err(invalid("sizing.base_quantity", "must be at least 1"));
        }
        if self.max_position_size < 1 {
            return Err(invalid("sizing.max_position_size", "must be at least 1"));
        }
        if let Some(cap) = self.max_risk_points_per_trade {
            if !(cap > 0.0) {
                return Err(invalid("sizing.max_risk_points_per_trade", "must be positive"));
            }
        }
        Ok(())
    }
}

// ─── Exits ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub first_scale_r: f64,
    pub first_scale_fraction: f64,
    pub breakeven_r: f64,
    /// Points beyond entry (in the position's favor) for the breakeven stop.
    pub breakeven_buffer_points: f64,
    pub second_scale_r: f64,
    pub second_scale_fraction: f64,
    pub trail_start_r: f64,
    pub trail_offset_r: f64,
    /// Close an untouched position after this many bars.
    pub max_bars_in_trade: u32,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            first_scale_r: 1.0,
            first_scale_fraction: 0.33,
            breakeven_r: 1.5,
            breakeven_buffer_points: 0.0,
            second_scale_r: 2.0,
            second_scale_fraction: 0.33,
            trail_start_r: 2.0,
            trail_offset_r: 0.5,
            max_bars_in_trade: 20,
        }
    }
}

impl ExitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, f) in [
            ("exits.first_scale_fraction", self.first_scale_fraction),
            ("exits.second_scale_fraction", self.second_scale_fraction),
        ] {
            if !(0.0..1.0).contains(&f) {
                return Err(invalid(field, "must be in [0, 1)"));
            }
        }
        if self.first_scale_fraction + self.second_scale_fraction >= 1.0 {
            return Err(invalid(
                "exits.second_scale_fraction",
                "scale fractions must leave a runner",
            ));
        }
        if !(self.first_scale_r > 0.0
            && self.first_scale_r <= self.breakeven_r
            && self.breakeven_r <= self.second_scale_r
            && self.second_scale_r <= self.trail_start_r)
        {
            return Err(invalid(
                "exits",
                "R thresholds must satisfy 0 < first_scale <= breakeven <= second_scale <= trail_start",
            ));
        }
        if !(self.trail_offset_r > 0.0) {
            return Err(invalid("exits.trail_offset_r", "must be positive"));
        }
        if self.breakeven_buffer_points < 0.0 {
            return Err(invalid("exits.breakeven_buffer_points", "must not be negative"));
        }
        if self.max_bars_in_trade == 0 {
            return Err(invalid("exits.max_bars_in_trade", "must be at least 1"));
        }
        Ok(())
    }
}

// ─── Lifecycle ──────────────────────────────────────────────────────

/// Which structural-reversal detector feeds the exit manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReversalConfig {
    #[default]
    None,
    /// A strong bar against the position.
    Momentum {
        min_body_ratio: f64,
        min_range_points: f64,
    },
    /// Close crossing an EMA against the position.
    EmaCross { period: usize },
    /// Either of the above.
    Structure {
        min_body_ratio: f64,
        min_range_points: f64,
        period: usize,
    },
}

impl ReversalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let (momentum, period) = match *self {
            ReversalConfig::None => (None, None),
            ReversalConfig::Momentum {
                min_body_ratio,
                min_range_points,
            } => (Some((min_body_ratio, min_range_points)), None),
            ReversalConfig::EmaCross { period } => (None, Some(period)),
            ReversalConfig::Structure {
                min_body_ratio,
                min_range_points,
                period,
            } => (Some((min_body_ratio, min_range_points)), Some(period)),
        };
        if let Some((ratio, range)) = momentum {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(invalid("lifecycle.reversal.min_body_ratio", "must be in (0, 1]"));
            }
            if range < 0.0 {
                return Err(invalid(
                    "lifecycle.reversal.min_range_points",
                    "must not be negative",
                ));
            }
        }
        if period == Some(0) {
            return Err(invalid("lifecycle.reversal.period", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Trade grade-C (WAIT) setups at their reduced multiplier.
    pub accept_wait_grades: bool,
    /// Half-width of the breakeven band when classifying trade results.
    pub breakeven_band_points: f64,
    pub reversal: ReversalConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            accept_wait_grades: true,
            breakeven_band_points: DEFAULT_BREAKEVEN_BAND_POINTS,
            reversal: ReversalConfig::None,
        }
    }
}

impl LifecycleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.breakeven_band_points < 0.0 {
            return Err(invalid("lifecycle.breakeven_band_points", "must not be negative"));
        }
        self.reversal.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn inverted_stop_bounds_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.validator.min_stop_points = 60.0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("validator.max_stop_points"));
    }

    #[test]
    fn scale_fractions_must_leave_runner() {
        let mut cfg = EngineConfig::default();
        cfg.exits.first_scale_fraction = 0.5;
        cfg.exits.second_scale_fraction = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn r_thresholds_must_be_ordered() {
        let mut cfg = EngineConfig::default();
        cfg.exits.breakeven_r = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unordered_tiers_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.scorer.reward_risk_tiers.reverse();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn confidence_out_of_range_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.validator.min_confidence = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"risk":{"max_daily_trades":3},"lifecycle":{"reversal":{"type":"momentum","min_body_ratio":0.75,"min_range_points":15.0}}}"#)
                .unwrap();
        assert_eq!(cfg.risk.max_daily_trades, 3);
        assert_eq!(cfg.risk.max_consecutive_losses, 3);
        assert_eq!(cfg.validator.min_stop_points, 15.0);
        assert!(matches!(cfg.lifecycle.reversal, ReversalConfig::Momentum { .. }));
    }

    #[test]
    fn loss_policy_serializes_snake_case() {
        let json = serde_json::to_string(&ConsecutiveLossPolicy::ResetDaily).unwrap();
        assert_eq!(json, "\"reset_daily\"");
    }
}
