//! Event sources: replay (backtest) and polling (live).
//!
//! Both sources yield the same event sequence for the same data: each bar,
//! then any setup stamped at that bar's time. `run_ready` dispatches whatever
//! a source has ready and returns; `run_events` repeats that until the source
//! is exhausted. Every action is recorded against its event time.

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::driver::{EngineEvent, LifecycleDriver};
use crate::domain::{Action, Bar, Setup};
use crate::error::InvariantViolation;

/// A pull-based stream of engine events.
pub trait EventSource {
    /// Next ready event, or `None` when nothing is ready right now.
    fn next_event(&mut self) -> Option<EngineEvent>;

    /// True once no further event will ever be produced.
    fn is_exhausted(&self) -> bool;
}

// ─── Replay ─────────────────────────────────────────────────────────

/// Historical bars merged with precomputed setups in timestamp order.
///
/// Bars keep their input order so the driver can flag stale bars. Setups are
/// sorted by `created_at` (stable). On a timestamp tie the bar goes first.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    bars: VecDeque<Bar>,
    setups: VecDeque<Setup>,
}

impl ReplaySource {
    pub fn new(bars: Vec<Bar>, mut setups: Vec<Setup>) -> Self {
        setups.sort_by_key(|s| s.created_at);
        Self {
            bars: bars.into(),
            setups: setups.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.bars.len() + self.setups.len()
    }
}

impl EventSource for ReplaySource {
    fn next_event(&mut self) -> Option<EngineEvent> {
        let bar_first = match (self.bars.front(), self.setups.front()) {
            (Some(bar), Some(setup)) => bar.timestamp <= setup.created_at,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };
        if bar_first {
            self.bars.pop_front().map(EngineEvent::Bar)
        } else {
            self.setups.pop_front().map(EngineEvent::Setup)
        }
    }

    fn is_exhausted(&self) -> bool {
        self.bars.is_empty() && self.setups.is_empty()
    }
}

// ─── Polling ────────────────────────────────────────────────────────

/// What a setup source sees when asked for a candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub last_bar: Option<Bar>,
    pub bars_seen: u64,
}

/// Live bar feed.
pub trait BarFeed {
    /// Most recent completed bar, or `None` once the feed has ended.
    /// Returning the same bar twice is fine; the source de-duplicates.
    fn latest_bar(&mut self) -> Option<Bar>;
}

/// Upstream setup producer.
pub trait SetupSource {
    fn fetch_candidate_setup(&mut self, snapshot: &MarketSnapshot) -> Option<Setup>;
}

impl<F> BarFeed for F
where
    F: FnMut() -> Option<Bar>,
{
    fn latest_bar(&mut self) -> Option<Bar> {
        self()
    }
}

impl<F> SetupSource for F
where
    F: FnMut(&MarketSnapshot) -> Option<Setup>,
{
    fn fetch_candidate_setup(&mut self, snapshot: &MarketSnapshot) -> Option<Setup> {
        self(snapshot)
    }
}

/// Polls a bar feed and a setup source. One poll yields the latest bar if it
/// is newer than the last one seen, then at most one candidate setup.
///
/// The caller owns the timer. `next_event` polls at most once per call and
/// returns `None` when that poll produced nothing new, so an idle feed hands
/// control straight back. `is_exhausted` turns true once the feed has ended
/// and every buffered event was handed out.
pub struct PollingSource<F: BarFeed, S: SetupSource> {
    feed: F,
    setups: S,
    snapshot: MarketSnapshot,
    pending: VecDeque<EngineEvent>,
    exhausted: bool,
}

impl<F: BarFeed, S: SetupSource> PollingSource<F, S> {
    pub fn new(feed: F, setups: S) -> Self {
        Self {
            feed,
            setups,
            snapshot: MarketSnapshot::default(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn snapshot(&self) -> &MarketSnapshot {
        &self.snapshot
    }

    /// Run one poll cycle. Returns false once the feed has ended.
    pub fn poll(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        let Some(bar) = self.feed.latest_bar() else {
            self.exhausted = true;
            return false;
        };
        let newer = self
            .snapshot
            .last_bar
            .as_ref()
            .map_or(true, |last| bar.timestamp > last.timestamp);
        if newer {
            self.snapshot.last_bar = Some(bar.clone());
            self.snapshot.bars_seen += 1;
            self.pending.push_back(EngineEvent::Bar(bar));
        }
        if let Some(setup) = self.setups.fetch_candidate_setup(&self.snapshot) {
            self.pending.push_back(EngineEvent::Setup(setup));
        }
        true
    }
}

impl<F: BarFeed, S: SetupSource> EventSource for PollingSource<F, S> {
    fn next_event(&mut self) -> Option<EngineEvent> {
        if self.pending.is_empty() {
            self.poll();
        }
        self.pending.pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending.is_empty()
    }
}

// ─── Driving ────────────────────────────────────────────────────────

/// One emitted action stamped with the time of the event that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedAction {
    pub timestamp: NaiveDateTime,
    pub action: Action,
}

/// Ordered record of every action a run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    pub entries: Vec<LoggedAction>,
    pub events_processed: u64,
}

impl ReplayLog {
    /// Entries excluding audit-only rejections.
    pub fn executable(&self) -> impl Iterator<Item = &LoggedAction> {
        self.entries.iter().filter(|e| e.action.is_executable())
    }
}

/// Dispatch every event `source` has ready, appending to `log`.
///
/// Returns the number of events processed. A live scheduler calls this once
/// per timer tick; an idle source costs a single poll.
pub fn run_ready<S: EventSource + ?Sized>(
    driver: &mut LifecycleDriver,
    source: &mut S,
    log: &mut ReplayLog,
) -> Result<u64, InvariantViolation> {
    let mut processed = 0;
    while let Some(event) = source.next_event() {
        let timestamp = event.timestamp();
        let actions = driver.dispatch(event)?;
        processed += 1;
        log.entries.extend(
            actions
                .into_iter()
                .map(|action| LoggedAction { timestamp, action }),
        );
    }
    log.events_processed += processed;
    Ok(processed)
}

/// Drive `source` through `driver` until it is exhausted.
///
/// Idle polls are retried immediately, so use this with sources that end on
/// their own (replay, recorded feeds). The first `InvariantViolation` aborts
/// the run and no later event is pulled.
pub fn run_events<S: EventSource + ?Sized>(
    driver: &mut LifecycleDriver,
    source: &mut S,
) -> Result<ReplayLog, InvariantViolation> {
    let mut log = ReplayLog::default();
    while !source.is_exhausted() {
        run_ready(driver, source, &mut log)?;
    }
    tracing::info!(
        events = log.events_processed,
        actions = log.entries.len(),
        trades = driver.closed_trades().len(),
        "event stream finished"
    );
    Ok(log)
}
