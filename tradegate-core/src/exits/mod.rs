//! Exit manager: per-position state machine.
//!
//! Stages: OPEN → PARTIAL_1R_TAKEN → BREAKEVEN_SET → PARTIAL_2R_TAKEN → TRAILING → CLOSED.
//!
//! Per-bar priority:
//! 1. Stop touched (checked first; same-bar stop/target resolves to the stop)
//! 2. Structural reversal
//! 3. Time exit while still OPEN (first scale level never reached)
//! 4. Stage progression: scale-exit before stop-move before trailing-start
//! 5. Target touched
//!
//! Stop moves made while processing a bar are only tested against the next bar.
//! `R` is the initial stop distance, fixed at entry.

pub mod position;
pub mod reversal;

pub use position::{ExitStage, Position, ScalePlan};
pub use reversal::{
    build_reversal_detector, AnyReversal, EmaCrossReversal, MomentumReversal, NoReversal,
    ReversalDetector,
};

use chrono::NaiveDateTime;

use crate::config::ExitConfig;
use crate::domain::{
    Action, Bar, Direction, ExitReason, Grade, LegKind, StopKind, TradeRecord, TradeResult,
    ValidSetup,
};
use crate::error::InvariantViolation;

/// Tolerance for level touches.
const LEVEL_EPSILON: f64 = 1e-9;

/// Result of feeding one bar to the exit manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarOutcome {
    pub actions: Vec<Action>,
    /// Set when the position closed on this bar.
    pub closed: Option<TradeRecord>,
}

#[derive(Debug, Clone)]
pub struct ExitManager {
    config: ExitConfig,
    breakeven_band: f64,
    position: Option<Position>,
}

impl ExitManager {
    pub fn new(config: ExitConfig, breakeven_band: f64) -> Self {
        Self {
            config,
            breakeven_band,
            position: None,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    #[cfg(test)]
    pub(crate) fn position_mut(&mut self) -> Option<&mut Position> {
        self.position.as_mut()
    }

    /// Open a position and return its `Enter` action.
    pub fn open(
        &mut self,
        setup: &ValidSetup,
        quantity: u32,
        grade: Grade,
        at: NaiveDateTime,
        bar_index: u64,
    ) -> Result<Action, InvariantViolation> {
        if self.position.is_some() {
            return Err(InvariantViolation::PositionAlreadyOpen);
        }
        let position = Position::open(setup, quantity, grade, at, bar_index, &self.config)?;
        tracing::info!(
            direction = %position.direction,
            entry = position.entry_price,
            stop = position.stop_price,
            target = position.target_price,
            quantity,
            %grade,
            "position opened"
        );
        let action = Action::Enter {
            direction: position.direction,
            entry_price: position.entry_price,
            stop_price: position.stop_price,
            target_price: position.target_price,
            quantity,
            grade,
        };
        self.position = Some(position);
        Ok(action)
    }

    /// Advance the open position by one bar. No-op when flat.
    pub fn on_bar(&mut self, bar: &Bar, reversal: bool) -> Result<BarOutcome, InvariantViolation> {
        let Some(mut pos) = self.position.take() else {
            return Ok(BarOutcome::default());
        };
        let mut actions = Vec::new();
        let step = self.step(&mut pos, bar, reversal, &mut actions);

        match step {
            Ok(Some(reason)) => {
                let record = self.close(&mut pos, reason, bar, &mut actions)?;
                Ok(BarOutcome {
                    actions,
                    closed: Some(record),
                })
            }
            Ok(None) => {
                self.position = Some(pos);
                Ok(BarOutcome {
                    actions,
                    closed: None,
                })
            }
            Err(e) => {
                self.position = Some(pos);
                Err(e)
            }
        }
    }

    /// Run the per-bar priority list. Returns the close reason if the
    /// remaining quantity must be closed on this bar.
    fn step(
        &self,
        pos: &mut Position,
        bar: &Bar,
        reversal: bool,
        actions: &mut Vec<Action>,
    ) -> Result<Option<ExitReason>, InvariantViolation> {
        if pos.stage == ExitStage::Closed {
            return Err(InvariantViolation::PositionClosed);
        }
        let sign = pos.direction.sign();
        let (favorable, adverse) = match pos.direction {
            Direction::Long => (bar.high, bar.low),
            Direction::Short => (bar.low, bar.high),
        };

        pos.bars_held += 1;
        pos.track_excursion(favorable, adverse);

        // 1. Stop
        if (adverse - pos.stop_price) * sign <= 0.0 {
            return Ok(Some(ExitReason::StoppedOut));
        }

        // 2. Reversal
        if reversal {
            return Ok(Some(ExitReason::ReversalExit));
        }

        // 3. Time
        if pos.stage == ExitStage::Open && pos.bars_held > self.config.max_bars_in_trade {
            return Ok(Some(ExitReason::TimeExit));
        }

        // 4. Progression
        let reached = |pos: &Position, k: f64| (favorable - pos.level(k)) * sign >= -LEVEL_EPSILON;

        if pos.stage == ExitStage::Open && reached(pos, self.config.first_scale_r) {
            let (quantity, price) = (pos.plan.first, pos.level(self.config.first_scale_r));
            self.scale_out(pos, LegKind::Scale1, quantity, price, bar, actions)?;
            pos.stage = ExitStage::Partial1RTaken;
        }

        if pos.stage == ExitStage::Partial1RTaken && reached(pos, self.config.breakeven_r) {
            let be = pos.entry_price + sign * self.config.breakeven_buffer_points;
            if pos.is_tighter(be) {
                pos.ratchet_stop(be)?;
                actions.push(Action::MoveStop {
                    kind: StopKind::Breakeven,
                    price: be,
                });
                tracing::debug!(stop = be, "stop moved to breakeven");
            }
            pos.stage = ExitStage::BreakevenSet;
        }

        if pos.stage == ExitStage::BreakevenSet && reached(pos, self.config.second_scale_r) {
            let (quantity, price) = (pos.plan.second, pos.level(self.config.second_scale_r));
            self.scale_out(pos, LegKind::Scale2, quantity, price, bar, actions)?;
            pos.stage = ExitStage::Partial2RTaken;
        }

        if pos.stage == ExitStage::Partial2RTaken && reached(pos, self.config.trail_start_r) {
            pos.stage = ExitStage::Trailing;
            tracing::debug!(best = pos.best_price, "trailing started");
        }

        if pos.stage == ExitStage::Trailing {
            let trail = pos.best_price - sign * self.config.trail_offset_r * pos.r_distance;
            let protective = (bar.close - trail) * sign > 0.0;
            if protective && pos.is_tighter(trail) {
                pos.ratchet_stop(trail)?;
                actions.push(Action::MoveStop {
                    kind: StopKind::Trail,
                    price: trail,
                });
                tracing::debug!(stop = trail, "trailing stop tightened");
            }
        }

        // 5. Target
        if (favorable - pos.target_price) * sign >= 0.0 {
            return Ok(Some(ExitReason::TargetHit));
        }

        Ok(None)
    }

    fn scale_out(
        &self,
        pos: &mut Position,
        kind: LegKind,
        quantity: u32,
        price: f64,
        bar: &Bar,
        actions: &mut Vec<Action>,
    ) -> Result<(), InvariantViolation> {
        if quantity == 0 {
            return Ok(());
        }
        pos.fill_exit(kind, quantity, price, bar.timestamp)?;
        actions.push(Action::ScaleExit {
            leg: kind,
            quantity,
            price,
        });
        tracing::debug!(?kind, quantity, price, "scaled out");
        Ok(())
    }

    fn close(
        &self,
        pos: &mut Position,
        reason: ExitReason,
        bar: &Bar,
        actions: &mut Vec<Action>,
    ) -> Result<TradeRecord, InvariantViolation> {
        let price = match reason {
            ExitReason::StoppedOut => pos.stop_price,
            ExitReason::TargetHit => pos.target_price,
            ExitReason::TimeExit | ExitReason::ReversalExit => bar.close,
        };
        let quantity = pos.remaining_quantity;
        pos.fill_exit(LegKind::Final, quantity, price, bar.timestamp)?;

        let closed: u32 = pos.legs.iter().map(|l| l.quantity).sum();
        if pos.remaining_quantity != 0 || closed != pos.original_quantity {
            return Err(InvariantViolation::QuantityMismatch {
                original: pos.original_quantity,
                closed,
            });
        }
        pos.stage = ExitStage::Closed;
        actions.push(Action::Close {
            reason,
            quantity,
            price,
        });

        let realized = pos.realized_points();
        let per_contract = realized / pos.original_quantity as f64;
        let record = TradeRecord {
            direction: pos.direction,
            grade: pos.grade,
            setup_type: pos.setup_type.clone(),
            confidence: pos.confidence,
            entry_time: pos.opened_at,
            entry_price: pos.entry_price,
            initial_stop: pos.initial_stop,
            target_price: pos.target_price,
            quantity: pos.original_quantity,
            exit_time: bar.timestamp,
            legs: pos.legs.clone(),
            exit_reason: reason,
            realized_pnl_points: realized,
            points_per_contract: per_contract,
            result: TradeResult::classify(per_contract, self.breakeven_band),
            r_multiple_achieved: per_contract / pos.r_distance,
            bars_held: pos.bars_held,
            mae_points: pos.favorable_move(pos.worst_price).min(0.0),
            mfe_points: pos.favorable_move(pos.best_price).max(0.0),
        };
        tracing::info!(
            reason = %reason,
            price,
            pnl = realized,
            result = ?record.result,
            bars = pos.bars_held,
            "position closed"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorConfig;
    use crate::domain::{
        ConfirmationBucket, RegimeBucket, SessionBucket, Setup, SetupContext,
    };
    use crate::validator::SetupValidator;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: t0() + Duration::minutes(i),
            open,
            high,
            low,
            close,
            volume: 100,
        }
    }

    fn valid(direction: Direction, entry: f64, stop: f64, target: f64) -> ValidSetup {
        let setup = Setup {
            direction,
            entry_price: entry,
            stop_price: stop,
            target_price: target,
            confidence: 0.7,
            context: SetupContext {
                session: SessionBucket::Morning,
                regime: RegimeBucket::Uptrend,
                confirmation: ConfirmationBucket::Confirmed,
            },
            created_at: t0(),
            setup_type: None,
            reasoning: None,
        };
        SetupValidator::new(ValidatorConfig::default())
            .validate(&setup, None)
            .unwrap()
    }

    /// Long 14600, stop 14580 (R = 20), target 14700.
    fn long_manager(quantity: u32) -> ExitManager {
        let mut em = ExitManager::new(ExitConfig::default(), 0.5);
        em.open(
            &valid(Direction::Long, 14600.0, 14580.0, 14700.0),
            quantity,
            Grade::A,
            t0(),
            0,
        )
        .unwrap();
        em
    }

    fn names(actions: &[Action]) -> Vec<&'static str> {
        actions.iter().map(Action::name).collect()
    }

    #[test]
    fn stop_touch_closes_at_stop() {
        let mut em = long_manager(3);
        let out = em.on_bar(&bar(1, 14600.0, 14605.0, 14579.0, 14585.0), false).unwrap();
        let trade = out.closed.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::StoppedOut);
        assert_eq!(trade.realized_pnl_points, -60.0);
        assert_eq!(trade.result, TradeResult::Loss);
        assert!(!em.is_open());
        assert_eq!(
            out.actions,
            vec![Action::Close {
                reason: ExitReason::StoppedOut,
                quantity: 3,
                price: 14580.0
            }]
        );
    }

    #[test]
    fn same_bar_stop_and_target_resolves_to_stop() {
        let mut em = long_manager(1);
        let out = em.on_bar(&bar(1, 14600.0, 14710.0, 14570.0, 14650.0), false).unwrap();
        assert_eq!(out.closed.unwrap().exit_reason, ExitReason::StoppedOut);
    }

    #[test]
    fn first_r_scales_out() {
        let mut em = long_manager(3);
        let out = em.on_bar(&bar(1, 14600.0, 14621.0, 14598.0, 14618.0), false).unwrap();
        assert_eq!(
            out.actions,
            vec![Action::ScaleExit {
                leg: LegKind::Scale1,
                quantity: 1,
                price: 14620.0
            }]
        );
        let p = em.position().unwrap();
        assert_eq!(p.stage, ExitStage::Partial1RTaken);
        assert_eq!(p.remaining_quantity, 2);
    }

    #[test]
    fn big_bar_runs_all_progression_in_priority_order() {
        let mut em = long_manager(3);
        // 2R = 14640 touched; close 14638 is above the trail (14640 - 10).
        let out = em.on_bar(&bar(1, 14600.0, 14640.0, 14599.0, 14638.0), false).unwrap();
        assert_eq!(
            names(&out.actions),
            vec!["SCALE_EXIT", "MOVE_STOP", "SCALE_EXIT", "MOVE_STOP"]
        );
        assert_eq!(
            out.actions[1],
            Action::MoveStop {
                kind: StopKind::Breakeven,
                price: 14600.0
            }
        );
        assert_eq!(
            out.actions[3],
            Action::MoveStop {
                kind: StopKind::Trail,
                price: 14630.0
            }
        );
        assert_eq!(em.position().unwrap().stage, ExitStage::Trailing);
    }

    #[test]
    fn stop_moved_this_bar_applies_next_bar() {
        let mut em = long_manager(3);
        // Reaches 1.5R and dips back to 14600 in the same bar: no stop-out yet.
        let out = em.on_bar(&bar(1, 14600.0, 14630.0, 14601.0, 14605.0), false).unwrap();
        assert!(out.closed.is_none());
        assert_eq!(em.position().unwrap().stop_price, 14600.0);
        let out = em.on_bar(&bar(2, 14605.0, 14606.0, 14599.0, 14600.0), false).unwrap();
        let trade = out.closed.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::StoppedOut);
        // +20 on one contract, 0 on two
        assert_eq!(trade.realized_pnl_points, 20.0);
    }

    #[test]
    fn time_exit_only_while_open() {
        let mut em = long_manager(2);
        for i in 1..=20 {
            let out = em.on_bar(&bar(i, 14600.0, 14605.0, 14595.0, 14601.0), false).unwrap();
            assert!(out.closed.is_none(), "bar {i}");
        }
        let out = em.on_bar(&bar(21, 14600.0, 14605.0, 14595.0, 14602.0), false).unwrap();
        let trade = out.closed.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::TimeExit);
        assert_eq!(trade.legs[0].price, 14602.0);
        assert_eq!(trade.bars_held, 21);
        assert_eq!(trade.result, TradeResult::Win);
    }

    #[test]
    fn no_time_exit_after_first_scale() {
        let mut em = long_manager(2);
        em.on_bar(&bar(1, 14600.0, 14620.0, 14599.0, 14610.0), false).unwrap();
        for i in 2..=30 {
            let out = em.on_bar(&bar(i, 14610.0, 14612.0, 14605.0, 14610.0), false).unwrap();
            assert!(out.closed.is_none());
        }
    }

    #[test]
    fn reversal_closes_at_bar_close() {
        let mut em = long_manager(1);
        let out = em.on_bar(&bar(1, 14610.0, 14612.0, 14590.0, 14591.0), true).unwrap();
        let trade = out.closed.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::ReversalExit);
        assert_eq!(trade.realized_pnl_points, -9.0);
    }

    #[test]
    fn single_contract_advances_stages_without_scaling() {
        let mut em = long_manager(1);
        let out = em.on_bar(&bar(1, 14600.0, 14641.0, 14599.0, 14640.0), false).unwrap();
        assert_eq!(names(&out.actions), vec!["MOVE_STOP", "MOVE_STOP"]);
        let p = em.position().unwrap();
        assert_eq!(p.stage, ExitStage::Trailing);
        assert_eq!(p.remaining_quantity, 1);
    }

    #[test]
    fn trail_only_tightens_and_stays_below_close() {
        let mut em = long_manager(3);
        em.on_bar(&bar(1, 14600.0, 14640.0, 14599.0, 14638.0), false).unwrap();
        assert_eq!(em.position().unwrap().stop_price, 14630.0);
        // Lower high: proposed trail unchanged, no move.
        let out = em.on_bar(&bar(2, 14638.0, 14639.0, 14632.0, 14635.0), false).unwrap();
        assert!(out.actions.is_empty());
        // New high but close below the proposed trail: no move.
        let out = em.on_bar(&bar(3, 14635.0, 14660.0, 14634.0, 14645.0), false).unwrap();
        assert!(out.actions.is_empty());
        assert_eq!(em.position().unwrap().stop_price, 14630.0);
        // Close above the trail: move to best - 10.
        let out = em.on_bar(&bar(4, 14645.0, 14655.0, 14644.0, 14654.0), false).unwrap();
        assert_eq!(
            out.actions,
            vec![Action::MoveStop {
                kind: StopKind::Trail,
                price: 14650.0
            }]
        );
    }

    #[test]
    fn target_hit_closes_runner_at_target() {
        let mut em = long_manager(3);
        em.on_bar(&bar(1, 14600.0, 14640.0, 14599.0, 14638.0), false).unwrap();
        let out = em.on_bar(&bar(2, 14638.0, 14701.0, 14637.0, 14699.0), false).unwrap();
        let trade = out.closed.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::TargetHit);
        // +20, +40, +100
        assert_eq!(trade.realized_pnl_points, 160.0);
        assert_eq!(trade.legs.iter().map(|l| l.quantity).sum::<u32>(), 3);
        assert_eq!(trade.mfe_points, 101.0);
        assert_eq!(trade.mae_points, -1.0);
    }

    #[test]
    fn short_mirror_scales_and_breakevens() {
        let mut em = ExitManager::new(ExitConfig::default(), 0.5);
        em.open(
            &valid(Direction::Short, 14600.0, 14620.0, 14520.0),
            3,
            Grade::B,
            t0(),
            0,
        )
        .unwrap();
        let out = em.on_bar(&bar(1, 14600.0, 14601.0, 14570.0, 14575.0), false).unwrap();
        assert_eq!(names(&out.actions), vec!["SCALE_EXIT", "MOVE_STOP"]);
        assert_eq!(em.position().unwrap().stop_price, 14600.0);
        let out = em.on_bar(&bar(2, 14575.0, 14600.0, 14570.0, 14590.0), false).unwrap();
        let trade = out.closed.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::StoppedOut);
        assert_eq!(trade.realized_pnl_points, 20.0);
    }

    #[test]
    fn breakeven_buffer_offsets_stop() {
        let cfg = ExitConfig {
            breakeven_buffer_points: 2.0,
            ..ExitConfig::default()
        };
        let mut em = ExitManager::new(cfg, 0.5);
        em.open(
            &valid(Direction::Long, 14600.0, 14580.0, 14700.0),
            2,
            Grade::A,
            t0(),
            0,
        )
        .unwrap();
        em.on_bar(&bar(1, 14600.0, 14630.0, 14599.0, 14625.0), false).unwrap();
        assert_eq!(em.position().unwrap().stop_price, 14602.0);
    }

    #[test]
    fn open_twice_is_violation() {
        let mut em = long_manager(1);
        let err = em
            .open(
                &valid(Direction::Long, 14600.0, 14580.0, 14700.0),
                1,
                Grade::A,
                t0(),
                1,
            )
            .unwrap_err();
        assert_eq!(err, InvariantViolation::PositionAlreadyOpen);
    }

    #[test]
    fn flat_manager_ignores_bars() {
        let mut em = ExitManager::new(ExitConfig::default(), 0.5);
        let out = em.on_bar(&bar(1, 1.0, 2.0, 0.5, 1.5), false).unwrap();
        assert_eq!(out, BarOutcome::default());
    }
}
