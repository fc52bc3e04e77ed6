//! Lifecycle driver: sequences the components for every inbound event.
//!
//! Setup path: position check → ordering check → validate → score →
//! recommendation filter → risk gate → size → open → record entry.
//!
//! Bar path: sanity/ordering check → risk clock → reversal detector →
//! exit manager → record outcome on close.
//!
//! At most one position is open at a time. Events must arrive in
//! chronological order; a stale or malformed event is a `DataError`, skipped
//! and counted without touching engine state.

use chrono::NaiveDateTime;

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Action, Bar, Recommendation, Rejection, Setup, TradeRecord};
use crate::error::{DataError, DenyReason, InvariantViolation};
use crate::exits::{build_reversal_detector, ExitManager, Position, ReversalDetector};
use crate::risk::{DailyRiskState, GateDecision, RiskLifecycle, RiskManager};
use crate::scorer::EdgeScorer;
use crate::sizer::{PositionSizer, RiskCaps};
use crate::validator::SetupValidator;

/// One inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Setup(Setup),
    Bar(Bar),
    /// Clock tick with no market data.
    Time(NaiveDateTime),
}

impl EngineEvent {
    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            EngineEvent::Setup(s) => s.created_at,
            EngineEvent::Bar(b) => b.timestamp,
            EngineEvent::Time(t) => *t,
        }
    }
}

pub struct LifecycleDriver {
    config: EngineConfig,
    validator: SetupValidator,
    scorer: EdgeScorer,
    risk: RiskManager,
    sizer: PositionSizer,
    exits: ExitManager,
    reversal: Box<dyn ReversalDetector>,

    // ── Stream state ──
    last_bar: Option<Bar>,
    bar_index: u64,
    last_event_time: Option<NaiveDateTime>,

    // ── Outputs ──
    closed_trades: Vec<TradeRecord>,
    data_errors: Vec<DataError>,
}

impl LifecycleDriver {
    /// Build a driver from a validated configuration.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let reversal = build_reversal_detector(&config.lifecycle.reversal);
        Ok(Self {
            validator: SetupValidator::new(config.validator.clone()),
            scorer: EdgeScorer::new(config.scorer.clone()),
            risk: RiskManager::new(config.risk.clone()),
            sizer: PositionSizer,
            exits: ExitManager::new(config.exits.clone(), config.lifecycle.breakeven_band_points),
            reversal,
            last_bar: None,
            bar_index: 0,
            last_event_time: None,
            closed_trades: Vec::new(),
            data_errors: Vec::new(),
            config,
        })
    }

    /// Resume with a persisted risk ledger.
    pub fn with_risk_state(mut self, state: DailyRiskState) -> Self {
        self.risk = RiskManager::restore(self.config.risk.clone(), state);
        self
    }

    /// Replace the configured reversal detector.
    pub fn with_reversal_detector(mut self, detector: Box<dyn ReversalDetector>) -> Self {
        self.reversal = detector;
        self
    }

    // ─── Event entry points ─────────────────────────────────────────

    pub fn dispatch(&mut self, event: EngineEvent) -> Result<Vec<Action>, InvariantViolation> {
        match event {
            EngineEvent::Setup(setup) => self.on_setup(setup),
            EngineEvent::Bar(bar) => self.on_bar(bar),
            EngineEvent::Time(now) => Ok(self.on_time(now)),
        }
    }

    /// Evaluate a candidate setup. Returns `Enter` or a single `Rejected`.
    pub fn on_setup(&mut self, setup: Setup) -> Result<Vec<Action>, InvariantViolation> {
        let now = setup.created_at;

        if self.exits.is_open() {
            return Ok(vec![self.reject(Rejection::Risk {
                reason: DenyReason::AlreadyInPosition,
            })]);
        }
        if let Some(last) = self.last_event_time.filter(|last| now < *last) {
            self.data_error(DataError::OutOfOrder {
                timestamp: now,
                last,
            });
            return Ok(Vec::new());
        }
        self.last_event_time = Some(now);
        self.risk.on_time(now);

        let market = self.last_bar.as_ref().map(|b| b.close);
        let valid = match self.validator.validate(&setup, market) {
            Ok(v) => v,
            Err(error) => return Ok(vec![self.reject(Rejection::Validation { error })]),
        };

        let edge = self.scorer.score_setup(&setup);
        tracing::debug!(
            score = edge.score,
            grade = %edge.grade,
            r_multiple = valid.r_multiple(),
            "setup scored"
        );
        let filtered = match edge.recommendation {
            Recommendation::Take => false,
            Recommendation::Wait => !self.config.lifecycle.accept_wait_grades,
            Recommendation::Skip => true,
        };
        if filtered {
            return Ok(vec![self.reject(Rejection::Recommendation {
                grade: edge.grade,
                recommendation: edge.recommendation,
            })]);
        }

        let hint = match self.risk.gate(&valid, now) {
            GateDecision::Allow(hint) => hint,
            GateDecision::Deny(reason) => {
                return Ok(vec![self.reject(Rejection::Risk { reason })]);
            }
        };

        let caps = RiskCaps::new(&self.config.sizing, hint);
        let quantity = self.sizer.size(edge.grade, &caps, valid.risk());
        if quantity == 0 {
            return Ok(vec![self.reject(Rejection::NoSize { grade: edge.grade })]);
        }

        let enter = self
            .exits
            .open(&valid, quantity, edge.grade, now, self.bar_index)?;
        self.risk.record_entry(now);
        Ok(vec![enter])
    }

    /// Advance the open position (if any) by one bar.
    pub fn on_bar(&mut self, bar: Bar) -> Result<Vec<Action>, InvariantViolation> {
        if !bar.is_sane() {
            self.data_error(DataError::MalformedBar {
                timestamp: bar.timestamp,
                detail: format!(
                    "O={} H={} L={} C={}",
                    bar.open, bar.high, bar.low, bar.close
                ),
            });
            return Ok(Vec::new());
        }
        let stale = match (&self.last_bar, self.last_event_time) {
            (Some(prev), _) if bar.timestamp <= prev.timestamp => Some(prev.timestamp),
            (_, Some(last)) if bar.timestamp < last => Some(last),
            _ => None,
        };
        if let Some(last) = stale {
            self.data_error(DataError::OutOfOrder {
                timestamp: bar.timestamp,
                last,
            });
            return Ok(Vec::new());
        }

        self.last_event_time = Some(bar.timestamp);
        self.risk.on_time(bar.timestamp);
        self.reversal.observe(&bar);

        let mut actions = Vec::new();
        if let Some(direction) = self.exits.position().map(|p| p.direction) {
            let reversal = self.reversal.is_reversal(direction, &bar);
            let outcome = self.exits.on_bar(&bar, reversal)?;
            actions = outcome.actions;
            if let Some(trade) = outcome.closed {
                self.risk.record_outcome(&trade, bar.timestamp);
                self.closed_trades.push(trade);
            }
        }

        for action in &actions {
            tracing::debug!(action = action.name(), at = %bar.timestamp, "action");
        }
        self.last_bar = Some(bar);
        self.bar_index += 1;
        Ok(actions)
    }

    /// Clock tick: date rollover and cooldown expiry. Never emits actions.
    /// A tick older than the last event is a `DataError`.
    pub fn on_time(&mut self, now: NaiveDateTime) -> Vec<Action> {
        if let Some(last) = self.last_event_time.filter(|last| now < *last) {
            self.data_error(DataError::OutOfOrder {
                timestamp: now,
                last,
            });
            return Vec::new();
        }
        self.last_event_time = Some(now);
        self.risk.on_time(now);
        Vec::new()
    }

    /// Operator halt: block new entries until `resume` or the next day.
    pub fn halt(&mut self, now: NaiveDateTime) {
        self.risk.halt(now);
    }

    pub fn resume(&mut self, now: NaiveDateTime) -> bool {
        self.risk.resume(now)
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn risk_state(&self) -> &DailyRiskState {
        self.risk.state()
    }

    pub fn risk_lifecycle(&self) -> RiskLifecycle {
        self.risk.lifecycle()
    }

    pub fn position(&self) -> Option<&Position> {
        self.exits.position()
    }

    pub fn closed_trades(&self) -> &[TradeRecord] {
        &self.closed_trades
    }

    pub fn take_closed_trades(&mut self) -> Vec<TradeRecord> {
        std::mem::take(&mut self.closed_trades)
    }

    pub fn data_errors(&self) -> &[DataError] {
        &self.data_errors
    }

    pub fn bars_processed(&self) -> u64 {
        self.bar_index
    }

    pub fn reversal_detector(&self) -> &str {
        self.reversal.name()
    }

    #[cfg(test)]
    pub(crate) fn open_position_mut(&mut self) -> Option<&mut Position> {
        self.exits.position_mut()
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn reject(&self, rejection: Rejection) -> Action {
        tracing::warn!(%rejection, "setup rejected");
        Action::rejected(rejection)
    }

    fn data_error(&mut self, error: DataError) {
        tracing::warn!(%error, "skipping event");
        self.data_errors.push(error);
    }
}
