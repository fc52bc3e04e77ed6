//! Candidate setups and the context tags the edge scorer reads.
//!
//! A `Setup` is produced by an external reasoning collaborator and is never
//! mutated by the engine. The validator turns it into a `ValidSetup`, which is
//! the only form the risk gate and sizer accept.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short. Multiply a price move by this to get
    /// the move in the position's favor.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

// ─── Context tags ───────────────────────────────────────────────────

/// Intraday session window, exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionBucket {
    Premarket,
    OpenDrive,
    Morning,
    Lunch,
    Afternoon,
    Close,
    AfterHours,
}

impl SessionBucket {
    /// Classify a wall-clock time into its session window.
    ///
    /// Windows: 04:00 premarket, 09:30 open drive, 10:00 morning, 12:00 lunch,
    /// 14:00 afternoon, 15:30 close, 16:00 onwards after hours.
    pub fn from_time(t: NaiveTime) -> Self {
        match t.hour() * 60 + t.minute() {
            m if (4 * 60..9 * 60 + 30).contains(&m) => SessionBucket::Premarket,
            m if (9 * 60 + 30..10 * 60).contains(&m) => SessionBucket::OpenDrive,
            m if (10 * 60..12 * 60).contains(&m) => SessionBucket::Morning,
            m if (12 * 60..14 * 60).contains(&m) => SessionBucket::Lunch,
            m if (14 * 60..15 * 60 + 30).contains(&m) => SessionBucket::Afternoon,
            m if (15 * 60 + 30..16 * 60).contains(&m) => SessionBucket::Close,
            _ => SessionBucket::AfterHours,
        }
    }
}

/// Market regime as classified by the market-context collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeBucket {
    StrongUptrend,
    Uptrend,
    Ranging,
    Downtrend,
    StrongDowntrend,
    Volatile,
}

/// Regime relative to a trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeAlignment {
    Aligned,
    Ranging,
    Counter,
}

/// EMA spread (fast minus mid) beyond which a stacked trend counts as strong.
pub const STRONG_TREND_SPREAD_POINTS: f64 = 20.0;

impl RegimeBucket {
    /// Classify a regime from a fast/mid/slow EMA stack and the current price.
    pub fn from_emas(ema_fast: f64, ema_mid: f64, ema_slow: f64, price: f64) -> Self {
        let spread = ema_fast - ema_mid;
        let stacked_up = ema_fast > ema_mid && ema_mid > ema_slow;
        let stacked_down = ema_fast < ema_mid && ema_mid < ema_slow;

        if stacked_up && price > ema_fast && spread > STRONG_TREND_SPREAD_POINTS {
            RegimeBucket::StrongUptrend
        } else if stacked_down && price < ema_fast && -spread > STRONG_TREND_SPREAD_POINTS {
            RegimeBucket::StrongDowntrend
        } else if stacked_up {
            RegimeBucket::Uptrend
        } else if stacked_down {
            RegimeBucket::Downtrend
        } else {
            RegimeBucket::Ranging
        }
    }

    pub fn alignment(self, direction: Direction) -> RegimeAlignment {
        match (self, direction) {
            (RegimeBucket::StrongUptrend | RegimeBucket::Uptrend, Direction::Long) => {
                RegimeAlignment::Aligned
            }
            (RegimeBucket::StrongDowntrend | RegimeBucket::Downtrend, Direction::Short) => {
                RegimeAlignment::Aligned
            }
            (RegimeBucket::Ranging, _) => RegimeAlignment::Ranging,
            _ => RegimeAlignment::Counter,
        }
    }
}

/// Whether confirming price action accompanied the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationBucket {
    Confirmed,
    Unconfirmed,
    Unknown,
}

/// Context tags attached to a setup by its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupContext {
    pub session: SessionBucket,
    pub regime: RegimeBucket,
    pub confirmation: ConfirmationBucket,
}

// ─── Setup ──────────────────────────────────────────────────────────

/// A candidate trade proposed by the reasoning collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Producer confidence in 0.0..=1.0.
    pub confidence: f64,
    pub context: SetupContext,
    /// Event time at which the setup was proposed.
    pub created_at: NaiveDateTime,
    /// Free-form label, e.g. "gap_fill" or "level_bounce". Reporting only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Setup {
    /// Distance from entry to stop.
    pub fn risk(&self) -> f64 {
        (self.entry_price - self.stop_price).abs()
    }

    /// Distance from entry to target.
    pub fn reward(&self) -> f64 {
        (self.target_price - self.entry_price).abs()
    }

    /// reward / risk, or `None` when risk is zero.
    pub fn r_multiple(&self) -> Option<f64> {
        let risk = self.risk();
        if risk > 0.0 {
            Some(self.reward() / risk)
        } else {
            None
        }
    }

    /// True when stop, entry and target are ordered for the direction.
    pub fn is_ordered(&self) -> bool {
        match self.direction {
            Direction::Long => {
                self.stop_price < self.entry_price && self.entry_price < self.target_price
            }
            Direction::Short => {
                self.target_price < self.entry_price && self.entry_price < self.stop_price
            }
        }
    }
}

/// A setup that passed validation. Only the validator constructs one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidSetup {
    setup: Setup,
    risk: f64,
    reward: f64,
    r_multiple: f64,
}

impl ValidSetup {
    pub(crate) fn new(setup: Setup, risk: f64, reward: f64) -> Self {
        Self {
            r_multiple: reward / risk,
            setup,
            risk,
            reward,
        }
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    pub fn into_setup(self) -> Setup {
        self.setup
    }

    /// Stop distance in points; always > 0.
    pub fn risk(&self) -> f64 {
        self.risk
    }

    pub fn reward(&self) -> f64 {
        self.reward
    }

    pub fn r_multiple(&self) -> f64 {
        self.r_multiple
    }
}

impl std::ops::Deref for ValidSetup {
    type Target = Setup;

    fn deref(&self) -> &Setup {
        &self.setup
    }
}
