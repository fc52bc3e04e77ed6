//! Open position state owned by the exit manager.
//!
//! Stops follow the ratchet rule: they may tighten, never loosen. A loosening
//! move is an `InvariantViolation`, not a no-op.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::ExitConfig;
use crate::domain::{Direction, ExitLeg, Grade, LegKind, ValidSetup};
use crate::error::InvariantViolation;

/// Per-position exit state machine stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExitStage {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "PARTIAL_1R_TAKEN")]
    Partial1RTaken,
    #[serde(rename = "BREAKEVEN_SET")]
    BreakevenSet,
    #[serde(rename = "PARTIAL_2R_TAKEN")]
    Partial2RTaken,
    #[serde(rename = "TRAILING")]
    Trailing,
    #[serde(rename = "CLOSED")]
    Closed,
}

/// Integer split of the opening quantity into two scale legs and a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalePlan {
    pub first: u32,
    pub second: u32,
    pub runner: u32,
}

impl ScalePlan {
    /// Split `quantity` by the two scale fractions.
    ///
    /// Each scale leg is `floor(quantity × fraction)`, raised to one contract
    /// when that still leaves a runner, and lowered so the runner keeps at
    /// least one contract. The runner takes the remainder, so the three legs
    /// always sum to `quantity`.
    pub fn split(quantity: u32, first_fraction: f64, second_fraction: f64) -> Self {
        let leg = |fraction: f64, available: u32| -> u32 {
            if available <= 1 || fraction <= 0.0 {
                return 0;
            }
            let raw = (quantity as f64 * fraction + 1e-9).floor() as u32;
            raw.max(1).min(available - 1)
        };
        let first = leg(first_fraction, quantity);
        let second = leg(second_fraction, quantity - first);
        Self {
            first,
            second,
            runner: quantity - first - second,
        }
    }

    pub fn total(&self) -> u32 {
        self.first + self.second + self.runner
    }
}

/// A live position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    // ── Entry ──
    pub direction: Direction,
    pub entry_price: f64,
    pub initial_stop: f64,
    pub target_price: f64,
    /// Initial stop distance. Fixed at entry; the unit of every exit threshold.
    pub r_distance: f64,
    pub grade: Grade,
    pub setup_type: Option<String>,
    pub confidence: f64,
    pub opened_at: NaiveDateTime,
    pub opened_at_bar_index: u64,

    // ── Quantities ──
    pub original_quantity: u32,
    pub remaining_quantity: u32,
    pub plan: ScalePlan,
    pub legs: Vec<ExitLeg>,

    // ── Live state ──
    pub stop_price: f64,
    pub stage: ExitStage,
    pub bars_held: u32,
    /// Most favorable price seen since entry.
    pub best_price: f64,
    /// Most adverse price seen since entry.
    pub worst_price: f64,
}

impl Position {
    pub fn open(
        setup: &ValidSetup,
        quantity: u32,
        grade: Grade,
        opened_at: NaiveDateTime,
        opened_at_bar_index: u64,
        config: &ExitConfig,
    ) -> Result<Self, InvariantViolation> {
        if quantity == 0 {
            return Err(InvariantViolation::ZeroQuantity);
        }
        Ok(Self {
            direction: setup.direction,
            entry_price: setup.entry_price,
            initial_stop: setup.stop_price,
            target_price: setup.target_price,
            r_distance: setup.risk(),
            grade,
            setup_type: setup.setup_type.clone(),
            confidence: setup.confidence,
            opened_at,
            opened_at_bar_index,
            original_quantity: quantity,
            remaining_quantity: quantity,
            plan: ScalePlan::split(
                quantity,
                config.first_scale_fraction,
                config.second_scale_fraction,
            ),
            legs: Vec::new(),
            stop_price: setup.stop_price,
            stage: ExitStage::Open,
            bars_held: 0,
            best_price: setup.entry_price,
            worst_price: setup.entry_price,
        })
    }

    /// Price at `k` R in the position's favor.
    pub fn level(&self, k: f64) -> f64 {
        self.entry_price + self.direction.sign() * k * self.r_distance
    }

    /// Signed move of `price` from entry, positive when favorable.
    pub fn favorable_move(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.direction.sign()
    }

    /// True if `candidate` is strictly tighter than the current stop.
    pub fn is_tighter(&self, candidate: f64) -> bool {
        (candidate - self.stop_price) * self.direction.sign() > 0.0
    }

    /// Move the stop. Loosening is a contract breach.
    pub fn ratchet_stop(&mut self, new_stop: f64) -> Result<(), InvariantViolation> {
        if self.stage == ExitStage::Closed {
            return Err(InvariantViolation::PositionClosed);
        }
        if (new_stop - self.stop_price) * self.direction.sign() < 0.0 {
            return Err(InvariantViolation::StopLoosened {
                from: self.stop_price,
                to: new_stop,
            });
        }
        self.stop_price = new_stop;
        Ok(())
    }

    /// Record an exit fill of `quantity` contracts.
    pub fn fill_exit(
        &mut self,
        kind: LegKind,
        quantity: u32,
        price: f64,
        timestamp: NaiveDateTime,
    ) -> Result<(), InvariantViolation> {
        if self.stage == ExitStage::Closed {
            return Err(InvariantViolation::PositionClosed);
        }
        self.remaining_quantity = self.remaining_quantity.checked_sub(quantity).ok_or(
            InvariantViolation::QuantityUnderflow {
                remaining: self.remaining_quantity,
                requested: quantity,
            },
        )?;
        self.legs.push(ExitLeg {
            kind,
            quantity,
            price,
            timestamp,
        });
        Ok(())
    }

    /// Quantity-weighted realized points over all legs so far.
    pub fn realized_points(&self) -> f64 {
        self.legs
            .iter()
            .map(|leg| self.favorable_move(leg.price) * leg.quantity as f64)
            .sum()
    }

    /// Update best/worst excursion from a bar's extremes.
    pub(crate) fn track_excursion(&mut self, favorable: f64, adverse: f64) {
        if self.favorable_move(favorable) > self.favorable_move(self.best_price) {
            self.best_price = favorable;
        }
        if self.favorable_move(adverse) < self.favorable_move(self.worst_price) {
            self.worst_price = adverse;
        }
    }
}
