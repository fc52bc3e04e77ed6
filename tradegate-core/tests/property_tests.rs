//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Quantity conservation: scale legs plus the final close equal the opened quantity
//! 2. Breakeven monotonicity: once breakeven is set, the stop never returns past entry
//! 3. Scale plans always sum to the opened quantity and keep a runner
//! 4. Validator round-trip: accepted setups are correctly ordered and meet the R minimum
//! 5. Scorer purity: identical inputs give identical scores
//! 6. Daily trade limit: entries beyond the cap are always denied

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use tradegate_core::config::{EngineConfig, ExitConfig, RiskConfig, ValidatorConfig};
use tradegate_core::domain::{
    Bar, ConfirmationBucket, Direction, Grade, RegimeBucket, SessionBucket, Setup, SetupContext,
    TradeRecord, TradeResult,
};
use tradegate_core::engine::{run_events, LifecycleDriver, ReplaySource};
use tradegate_core::error::DenyReason;
use tradegate_core::exits::{ExitManager, ExitStage, ScalePlan};
use tradegate_core::risk::{GateDecision, RiskLifecycle, RiskManager};
use tradegate_core::scorer::EdgeScorer;
use tradegate_core::validator::SetupValidator;

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(9, 45, 0)
        .unwrap()
}

fn setup(direction: Direction, entry: f64, risk: f64, reward: f64, context: SetupContext) -> Setup {
    let sign = direction.sign();
    Setup {
        direction,
        entry_price: entry,
        stop_price: entry - sign * risk,
        target_price: entry + sign * reward,
        confidence: 0.5,
        context,
        created_at: t0(),
        setup_type: None,
        reasoning: None,
    }
}

fn neutral_context() -> SetupContext {
    SetupContext {
        session: SessionBucket::Morning,
        regime: RegimeBucket::Ranging,
        confirmation: ConfirmationBucket::Confirmed,
    }
}

/// Build bars from per-bar close changes and wick sizes, starting at `start`.
fn path_to_bars(start: f64, steps: &[(f64, f64, f64)]) -> Vec<Bar> {
    let mut close = start;
    steps
        .iter()
        .enumerate()
        .map(|(i, &(delta, up_wick, down_wick))| {
            let open = close;
            close = open + delta;
            Bar {
                timestamp: t0() + Duration::minutes(i as i64 + 1),
                open,
                high: open.max(close) + up_wick,
                low: open.min(close) - down_wick,
                close,
                volume: 100,
            }
        })
        .collect()
}

fn open_manager(direction: Direction, quantity: u32) -> ExitManager {
    let s = setup(direction, 14600.0, 20.0, 100.0, neutral_context());
    let valid = SetupValidator::new(ValidatorConfig::default())
        .validate(&s, None)
        .unwrap();
    let mut em = ExitManager::new(ExitConfig::default(), 0.5);
    em.open(&valid, quantity, Grade::A, t0(), 0).unwrap();
    em
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

fn arb_steps() -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec((-9.0..9.0_f64, 0.0..6.0_f64, 0.0..6.0_f64), 1..150)
}

fn arb_context() -> impl Strategy<Value = SetupContext> {
    let session = prop_oneof![
        Just(SessionBucket::Premarket),
        Just(SessionBucket::OpenDrive),
        Just(SessionBucket::Morning),
        Just(SessionBucket::Lunch),
        Just(SessionBucket::Afternoon),
        Just(SessionBucket::Close),
        Just(SessionBucket::AfterHours),
    ];
    let regime = prop_oneof![
        Just(RegimeBucket::StrongUptrend),
        Just(RegimeBucket::Uptrend),
        Just(RegimeBucket::Ranging),
        Just(RegimeBucket::Downtrend),
        Just(RegimeBucket::StrongDowntrend),
        Just(RegimeBucket::Volatile),
    ];
    let confirmation = prop_oneof![
        Just(ConfirmationBucket::Confirmed),
        Just(ConfirmationBucket::Unconfirmed),
        Just(ConfirmationBucket::Unknown),
    ];
    (session, regime, confirmation).prop_map(|(session, regime, confirmation)| SetupContext {
        session,
        regime,
        confirmation,
    })
}

// ── 1. Quantity conservation ─────────────────────────────────────────

proptest! {
    /// Remaining plus exited quantity always equals the opened quantity, and a
    /// closed trade's legs sum to it exactly.
    #[test]
    fn exit_quantities_are_conserved(
        direction in arb_direction(),
        quantity in 1u32..25,
        steps in arb_steps(),
    ) {
        let mut em = open_manager(direction, quantity);
        let mut closed: Option<TradeRecord> = None;
        for bar in path_to_bars(14600.0, &steps) {
            let out = em.on_bar(&bar, false).unwrap();
            if let Some(p) = em.position() {
                let exited: u32 = p.legs.iter().map(|l| l.quantity).sum();
                prop_assert_eq!(exited + p.remaining_quantity, quantity);
            }
            if out.closed.is_some() {
                closed = out.closed;
                break;
            }
        }
        if let Some(trade) = closed {
            prop_assert_eq!(trade.legs.iter().map(|l| l.quantity).sum::<u32>(), quantity);
            prop_assert_eq!(trade.quantity, quantity);
            prop_assert!(em.position().is_none());
        }
    }
}

// ── 2. Breakeven monotonicity ────────────────────────────────────────

proptest! {
    /// After breakeven is set, the stop stays at or beyond entry on the
    /// favorable side, and never loosens.
    #[test]
    fn stop_never_returns_past_entry_after_breakeven(
        direction in arb_direction(),
        quantity in 1u32..10,
        steps in arb_steps(),
    ) {
        let mut em = open_manager(direction, quantity);
        let sign = direction.sign();
        let mut last_stop = em.position().unwrap().stop_price;
        for bar in path_to_bars(14600.0, &steps) {
            let out = em.on_bar(&bar, false).unwrap();
            if out.closed.is_some() {
                break;
            }
            let p = em.position().unwrap();
            prop_assert!((p.stop_price - last_stop) * sign >= 0.0);
            if p.stage >= ExitStage::BreakevenSet {
                prop_assert!((p.stop_price - p.entry_price) * sign >= 0.0);
            }
            last_stop = p.stop_price;
        }
    }
}

// ── 3. Scale plans ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn scale_plan_sums_and_keeps_runner(
        quantity in 1u32..1000,
        f1 in 0.0..0.5_f64,
        f2 in 0.0..0.49_f64,
    ) {
        let plan = ScalePlan::split(quantity, f1, f2);
        prop_assert_eq!(plan.total(), quantity);
        prop_assert!(plan.runner >= 1);
    }
}

// ── 4. Validator round-trip ──────────────────────────────────────────

proptest! {
    #[test]
    fn accepted_setups_are_ordered_and_meet_min_r(
        direction in arb_direction(),
        entry in 1000.0..20000.0_f64,
        risk in 1.0..80.0_f64,
        reward in 1.0..400.0_f64,
    ) {
        let cfg = ValidatorConfig::default();
        let s = setup(direction, entry, risk, reward, neutral_context());
        if let Ok(valid) = SetupValidator::new(cfg.clone()).validate(&s, Some(entry)) {
            match direction {
                Direction::Long => prop_assert!(s.stop_price < s.entry_price && s.entry_price < s.target_price),
                Direction::Short => prop_assert!(s.target_price < s.entry_price && s.entry_price < s.stop_price),
            }
            prop_assert!(valid.r_multiple() >= cfg.min_r_multiple - 1e-9);
            prop_assert!(valid.risk() >= cfg.min_stop_points && valid.risk() <= cfg.max_stop_points);
        }
    }

    /// Just under the minimum R is always rejected.
    #[test]
    fn r_below_minimum_is_rejected(risk in 15.0..50.0_f64, shortfall in 0.01..1.0_f64) {
        let cfg = ValidatorConfig::default();
        let reward = risk * (cfg.min_r_multiple - shortfall);
        let s = setup(Direction::Long, 14600.0, risk, reward, neutral_context());
        prop_assert!(SetupValidator::new(cfg).validate(&s, None).is_err());
    }
}

// ── 5. Scorer purity ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn scorer_is_pure_and_bounded(
        direction in arb_direction(),
        context in arb_context(),
        reward in 20.0..200.0_f64,
    ) {
        let scorer = EdgeScorer::new(Default::default());
        let s = setup(direction, 14600.0, 20.0, reward, context);
        let a = scorer.score(&s, &context);
        let b = scorer.score(&s, &context);
        prop_assert_eq!(&a, &b);
        prop_assert!(a.score <= 100);
        prop_assert_eq!(
            a.score,
            a.session_points + a.regime_points + a.confirmation_points + a.reward_risk_points
        );
        prop_assert_eq!(a.grade, Grade::from_score(a.score));
    }
}

// ── 6. Daily trade limit ─────────────────────────────────────────────

proptest! {
    #[test]
    fn entries_past_the_cap_are_denied(max_trades in 1u32..8, extra in 1u32..5) {
        let config = RiskConfig {
            max_daily_trades: max_trades,
            ..RiskConfig::default()
        };
        let mut risk = RiskManager::new(config);
        let s = setup(Direction::Long, 14600.0, 20.0, 100.0, neutral_context());
        let valid = SetupValidator::new(ValidatorConfig::default())
            .validate(&s, None)
            .unwrap();
        for i in 0..max_trades {
            let now = t0() + Duration::minutes(i as i64);
            prop_assert!(matches!(risk.gate(&valid, now), GateDecision::Allow(_)));
            risk.record_entry(now);
        }
        for i in 0..extra {
            let now = t0() + Duration::minutes((max_trades + i) as i64);
            prop_assert_eq!(
                risk.gate(&valid, now),
                GateDecision::Deny(DenyReason::DailyTradeLimit)
            );
        }
        prop_assert_eq!(risk.lifecycle(), RiskLifecycle::Halted);
    }
}

// ── 7. Driver determinism ────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Replaying the same events twice yields identical logs and trades.
    #[test]
    fn replay_is_deterministic(steps in arb_steps(), entries in prop::collection::vec(0usize..150, 0..6)) {
        let bars = path_to_bars(14600.0, &steps);
        let setups: Vec<Setup> = entries
            .iter()
            .filter_map(|&i| bars.get(i))
            .map(|b| {
                let mut s = setup(Direction::Long, b.close, 20.0, 80.0, neutral_context());
                s.created_at = b.timestamp;
                s
            })
            .collect();
        let run = || {
            let mut d = LifecycleDriver::new(EngineConfig::default()).unwrap();
            let mut src = ReplaySource::new(bars.clone(), setups.clone());
            let log = run_events(&mut d, &mut src).unwrap();
            (log, d.take_closed_trades())
        };
        let (log_a, trades_a) = run();
        let (log_b, trades_b) = run();
        prop_assert_eq!(log_a, log_b);
        prop_assert!(trades_a.iter().all(|t| matches!(
            t.result,
            TradeResult::Win | TradeResult::Loss | TradeResult::Breakeven
        )));
        prop_assert_eq!(trades_a, trades_b);
    }
}
