//! Risk manager: the daily risk ledger and its state machine.
//!
//! States:
//! - NORMAL: trading allowed at full size
//! - WARNING: approaching a daily limit; trading allowed at reduced size
//! - COOLDOWN: entries blocked until `cooldown_until` after a losing streak
//! - HALTED: entries blocked until the calendar date advances
//!
//! `on_time`, `record_entry` and `record_outcome` (plus the operator `halt` /
//! `resume` pair) are the only mutators of `DailyRiskState`. Every public
//! operation first applies date rollover and cooldown expiry for the event time
//! it is given, so the ledger never depends on a wall clock.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::{ConsecutiveLossPolicy, RiskConfig};
use crate::domain::{TradeRecord, TradeResult, ValidSetup};
use crate::error::DenyReason;

/// Lifecycle state of the daily ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLifecycle {
    #[default]
    Normal,
    Warning,
    Cooldown,
    Halted,
}

impl std::fmt::Display for RiskLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLifecycle::Normal => write!(f, "NORMAL"),
            RiskLifecycle::Warning => write!(f, "WARNING"),
            RiskLifecycle::Cooldown => write!(f, "COOLDOWN"),
            RiskLifecycle::Halted => write!(f, "HALTED"),
        }
    }
}

/// Why the ledger is halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaltReason {
    DailyTradeLimit,
    DailyLossLimit,
    Operator,
}

impl HaltReason {
    fn deny_reason(self) -> DenyReason {
        match self {
            HaltReason::DailyTradeLimit => DenyReason::DailyTradeLimit,
            HaltReason::DailyLossLimit => DenyReason::DailyLossLimit,
            HaltReason::Operator => DenyReason::OperatorHalt,
        }
    }
}

/// The daily risk ledger. Owned by `RiskManager`; serializable so a live
/// process can persist and restore it across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyRiskState {
    /// Trading day of the last event seen; `None` before the first event.
    pub calendar_date: Option<NaiveDate>,
    pub trades_opened_today: u32,
    pub cumulative_pnl_points: f64,
    pub consecutive_losses: u32,
    pub cooldown_until: Option<NaiveDateTime>,
    pub lifecycle: RiskLifecycle,
    pub halt_reason: Option<HaltReason>,
    pub wins_today: u32,
    pub losses_today: u32,
}

/// Size adjustment handed from the gate to the sizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeHint {
    pub factor: f64,
}

impl SizeHint {
    pub const FULL: SizeHint = SizeHint { factor: 1.0 };
}

/// Outcome of the risk gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Allow(SizeHint),
    Deny(DenyReason),
}

/// A lifecycle change, reported for logging and audit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskTransition {
    pub from: RiskLifecycle,
    pub to: RiskLifecycle,
    pub at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    state: DailyRiskState,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: DailyRiskState::default(),
        }
    }

    /// Resume from a persisted ledger.
    pub fn restore(config: RiskConfig, state: DailyRiskState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &DailyRiskState {
        &self.state
    }

    pub fn lifecycle(&self) -> RiskLifecycle {
        self.state.lifecycle
    }

    /// Copy of the ledger for persistence.
    pub fn snapshot(&self) -> DailyRiskState {
        self.state.clone()
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    // ─── Mutators ───────────────────────────────────────────────────

    /// Apply date rollover and cooldown expiry for `now`.
    pub fn on_time(&mut self, now: NaiveDateTime) -> Option<RiskTransition> {
        let today = now.date();
        match self.state.calendar_date {
            None => self.state.calendar_date = Some(today),
            Some(date) if today > date => self.roll_day(today),
            Some(_) => {}
        }
        self.reevaluate(now)
    }

    /// Decide whether a validated setup may be entered at `now`.
    pub fn gate(&mut self, setup: &ValidSetup, now: NaiveDateTime) -> GateDecision {
        self.on_time(now);
        let decision = match self.state.lifecycle {
            RiskLifecycle::Halted => GateDecision::Deny(
                self.state
                    .halt_reason
                    .unwrap_or(HaltReason::DailyTradeLimit)
                    .deny_reason(),
            ),
            RiskLifecycle::Cooldown => match self.state.cooldown_until {
                Some(until) => GateDecision::Deny(DenyReason::ConsecutiveLossCooldown { until }),
                None => GateDecision::Allow(SizeHint::FULL),
            },
            RiskLifecycle::Warning => GateDecision::Allow(SizeHint {
                factor: self.config.warning_size_factor,
            }),
            RiskLifecycle::Normal => GateDecision::Allow(SizeHint::FULL),
        };
        tracing::debug!(
            direction = %setup.direction,
            entry = setup.entry_price,
            state = %self.state.lifecycle,
            ?decision,
            "risk gate"
        );
        decision
    }

    /// Record that a position was opened at `now`.
    pub fn record_entry(&mut self, now: NaiveDateTime) -> Option<RiskTransition> {
        let rolled = self.on_time(now);
        self.state.trades_opened_today += 1;
        tracing::info!(
            trades = self.state.trades_opened_today,
            max = self.config.max_daily_trades,
            "trade opened"
        );
        self.reevaluate(now).or(rolled)
    }

    /// Fold a closed trade into the ledger and re-evaluate state.
    pub fn record_outcome(&mut self, trade: &TradeRecord, now: NaiveDateTime) -> Option<RiskTransition> {
        let rolled = self.on_time(now);
        self.state.cumulative_pnl_points += trade.realized_pnl_points;

        match trade.result {
            TradeResult::Win => {
                self.state.wins_today += 1;
                self.state.consecutive_losses = 0;
            }
            TradeResult::Loss => {
                self.state.losses_today += 1;
                self.state.consecutive_losses += 1;
                if self.state.consecutive_losses >= self.config.max_consecutive_losses {
                    let until = now + Duration::minutes(self.config.cooldown_minutes);
                    self.state.cooldown_until = Some(until);
                    tracing::warn!(
                        consecutive_losses = self.state.consecutive_losses,
                        %until,
                        "consecutive-loss cooldown started"
                    );
                }
            }
            TradeResult::Breakeven => {}
        }

        tracing::info!(
            pnl = trade.realized_pnl_points,
            result = ?trade.result,
            daily_pnl = self.state.cumulative_pnl_points,
            consecutive_losses = self.state.consecutive_losses,
            "trade outcome recorded"
        );
        self.reevaluate(now).or(rolled)
    }

    /// Operator halt. Lasts until `resume` or the next trading day.
    pub fn halt(&mut self, now: NaiveDateTime) -> Option<RiskTransition> {
        self.on_time(now);
        if self.state.halt_reason.is_none() {
            self.state.halt_reason = Some(HaltReason::Operator);
        }
        self.reevaluate(now)
    }

    /// Lift an operator halt. Limit-driven halts are not affected; returns
    /// whether an operator halt was lifted.
    pub fn resume(&mut self, now: NaiveDateTime) -> bool {
        self.on_time(now);
        if self.state.halt_reason != Some(HaltReason::Operator) {
            return false;
        }
        self.state.halt_reason = None;
        self.reevaluate(now);
        tracing::info!(state = %self.state.lifecycle, "trading resumed by operator");
        true
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn roll_day(&mut self, today: NaiveDate) {
        tracing::info!(
            %today,
            previous_pnl = self.state.cumulative_pnl_points,
            previous_trades = self.state.trades_opened_today,
            "new trading day"
        );
        let s = &mut self.state;
        s.calendar_date = Some(today);
        s.trades_opened_today = 0;
        s.cumulative_pnl_points = 0.0;
        s.wins_today = 0;
        s.losses_today = 0;
        s.halt_reason = None;
        if self.config.consecutive_loss_policy == ConsecutiveLossPolicy::ResetDaily {
            s.consecutive_losses = 0;
            s.cooldown_until = None;
        }
    }

    fn reevaluate(&mut self, now: NaiveDateTime) -> Option<RiskTransition> {
        let s = &mut self.state;
        let cfg = &self.config;

        if s.halt_reason.is_none() {
            if s.trades_opened_today >= cfg.max_daily_trades {
                s.halt_reason = Some(HaltReason::DailyTradeLimit);
            } else if s.cumulative_pnl_points <= -cfg.max_daily_loss_points {
                s.halt_reason = Some(HaltReason::DailyLossLimit);
            }
        }

        if s.cooldown_until.is_some_and(|until| now >= until) {
            s.cooldown_until = None;
        }

        let next = if s.halt_reason.is_some() {
            RiskLifecycle::Halted
        } else if s.cooldown_until.is_some() {
            RiskLifecycle::Cooldown
        } else if s.trades_opened_today + 1 >= cfg.max_daily_trades
            || -s.cumulative_pnl_points >= cfg.warning_loss_fraction * cfg.max_daily_loss_points
        {
            RiskLifecycle::Warning
        } else {
            RiskLifecycle::Normal
        };

        if next == s.lifecycle {
            return None;
        }
        let transition = RiskTransition {
            from: s.lifecycle,
            to: next,
            at: now,
        };
        s.lifecycle = next;
        match next {
            RiskLifecycle::Halted => tracing::warn!(
                from = %transition.from,
                reason = ?s.halt_reason,
                "trading halted"
            ),
            _ => tracing::info!(from = %transition.from, to = %next, "risk state changed"),
        }
        Some(transition)
    }
}
