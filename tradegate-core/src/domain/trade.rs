//! Closed-trade records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Direction, Grade};

/// Default half-width, in points per contract, of the band classified as breakeven.
pub const DEFAULT_BREAKEVEN_BAND_POINTS: f64 = 0.5;

/// Which leg of the exit plan a fill belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegKind {
    /// First scale-out at 1R.
    Scale1,
    /// Second scale-out at 2R.
    Scale2,
    /// Whatever remains, closed by stop, target, time or reversal.
    Final,
}

/// A single exit fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitLeg {
    pub kind: LegKind,
    pub quantity: u32,
    pub price: f64,
    pub timestamp: NaiveDateTime,
}

/// Why the final leg closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StoppedOut,
    TargetHit,
    TimeExit,
    ReversalExit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StoppedOut => write!(f, "STOPPED_OUT"),
            ExitReason::TargetHit => write!(f, "TARGET_HIT"),
            ExitReason::TimeExit => write!(f, "TIME_EXIT"),
            ExitReason::ReversalExit => write!(f, "REVERSAL_EXIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeResult {
    Win,
    Loss,
    Breakeven,
}

impl TradeResult {
    /// Classify by points per contract: above `+band` wins, below `-band` loses.
    pub fn classify(points_per_contract: f64, band: f64) -> Self {
        if points_per_contract > band {
            TradeResult::Win
        } else if points_per_contract < -band {
            TradeResult::Loss
        } else {
            TradeResult::Breakeven
        }
    }
}

/// Immutable summary of a closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub direction: Direction,
    pub grade: Grade,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_type: Option<String>,
    /// Producer confidence carried over from the setup.
    #[serde(default)]
    pub confidence: f64,

    // ── Entry ──
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub initial_stop: f64,
    pub target_price: f64,
    pub quantity: u32,

    // ── Exit ──
    pub exit_time: NaiveDateTime,
    pub legs: Vec<ExitLeg>,
    pub exit_reason: ExitReason,

    // ── Outcome ──
    /// Sum over legs of quantity × favorable price move.
    pub realized_pnl_points: f64,
    pub points_per_contract: f64,
    pub result: TradeResult,
    /// Points per contract divided by the initial stop distance.
    pub r_multiple_achieved: f64,
    pub bars_held: u32,
    /// Maximum adverse excursion, points per contract (≤ 0).
    pub mae_points: f64,
    /// Maximum favorable excursion, points per contract (≥ 0).
    pub mfe_points: f64,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.result == TradeResult::Win
    }

    pub fn is_loss(&self) -> bool {
        self.result == TradeResult::Loss
    }

    /// Quantity-weighted average exit price.
    pub fn avg_exit_price(&self) -> f64 {
        let qty: u32 = self.legs.iter().map(|l| l.quantity).sum();
        if qty == 0 {
            return self.entry_price;
        }
        let notional: f64 = self.legs.iter().map(|l| l.price * l.quantity as f64).sum();
        notional / qty as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_half_point_band() {
        let band = DEFAULT_BREAKEVEN_BAND_POINTS;
        assert_eq!(TradeResult::classify(0.51, band), TradeResult::Win);
        assert_eq!(TradeResult::classify(0.5, band), TradeResult::Breakeven);
        assert_eq!(TradeResult::classify(0.0, band), TradeResult::Breakeven);
        assert_eq!(TradeResult::classify(-0.5, band), TradeResult::Breakeven);
        assert_eq!(TradeResult::classify(-0.51, band), TradeResult::Loss);
    }

    #[test]
    fn exit_reason_display_matches_wire_names() {
        assert_eq!(ExitReason::TargetHit.to_string(), "TARGET_HIT");
        let json = serde_json::to_string(&ExitReason::StoppedOut).unwrap();
        assert_eq!(json, "\"STOPPED_OUT\"");
    }
}
